use anyhow::Result;
use std::env;
use std::path::Path;

use crate::commands::CommandReport;
use crate::fair::archive::resolve_parser_bin;
use crate::fair::config::load_config;
use crate::fair::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/fair_env_allowlist.rs"));

fn set_env_keys() -> Vec<&'static str> {
    GENERATED_FAIR_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some())
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));
    report.detail(format!("fair_home={}", paths.fair_home.display()));
    report.detail(format!(
        "config_file={} ({})",
        paths.config_file.display(),
        if paths.config_file.exists() { "found" } else { "defaults" }
    ));

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("config invalid: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("parser.bin={}", cfg.parser.bin));
    report.detail(format!("parser.timeout_secs={}", cfg.parser.timeout_secs));
    report.detail(format!("parser.skip_normalizers={}", cfg.parser.skip_normalizers));
    report.detail(format!("discovery.patterns={}", cfg.discovery.patterns.join(",")));
    report.detail(format!("batch.jobs={}", cfg.batch.jobs));

    match resolve_parser_bin(Path::new(&cfg.parser.bin)) {
        Ok(bin) => report.detail(format!("parser.resolved={}", bin.display())),
        Err(err) => report.issue(err.to_string()),
    }

    let set = set_env_keys();
    if set.is_empty() {
        report.detail("env.overrides=none");
    } else {
        report.detail(format!("env.overrides={}", set.join(",")));
    }
    Ok(report)
}
