use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::error::FairError;
use crate::fair::{discovery, paths};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub bin: String,
    pub timeout_secs: u64,
    pub skip_normalizers: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            bin: "nomad".to_string(),
            timeout_secs: 600,
            skip_normalizers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub patterns: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["vasprun.xml".to_string(), "*vasprun.xml".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub jobs: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FairConfig {
    pub parser: ParserConfig,
    pub discovery: DiscoveryConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialFairConfig {
    parser: Option<ParserConfig>,
    discovery: Option<DiscoveryConfig>,
    batch: Option<BatchConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = split_csv(&v);
            if out.is_empty() { fallback.to_vec() } else { out }
        }
        Err(_) => fallback.to_vec(),
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub fn validate(cfg: &FairConfig) -> Result<(), FairError> {
    if cfg.parser.bin.trim().is_empty() {
        return Err(FairError::InvalidConfig(
            "parser bin cannot be empty".to_string(),
        ));
    }
    if cfg.batch.jobs == 0 {
        return Err(FairError::InvalidConfig(
            "batch jobs must be >= 1".to_string(),
        ));
    }
    if cfg.discovery.patterns.iter().all(|p| p.trim().is_empty()) {
        return Err(FairError::InvalidConfig(
            "discovery needs at least one file name pattern".to_string(),
        ));
    }
    discovery::build_matcher(&cfg.discovery.patterns)?;
    Ok(())
}

/// Overlay the sections present in a TOML document onto `base`. A section that
/// is present replaces the defaults field by field; absent sections are kept.
pub fn merge_toml(base: &mut FairConfig, raw: &str, origin: &Path) -> Result<(), FairError> {
    let parsed: PartialFairConfig = toml::from_str(raw)
        .map_err(|err| FairError::InvalidConfig(format!("{}: {err}", origin.display())))?;
    if let Some(parser) = parsed.parser {
        base.parser = parser;
    }
    if let Some(discovery) = parsed.discovery {
        base.discovery = discovery;
    }
    if let Some(batch) = parsed.batch {
        base.batch = batch;
    }
    Ok(())
}

fn merge_file_config(base: &mut FairConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    merge_toml(base, &raw, path)?;
    Ok(())
}

fn apply_env_overrides(cfg: &mut FairConfig) {
    cfg.parser.bin = env_or_string("FAIR_PARSER_BIN", &cfg.parser.bin);
    cfg.parser.timeout_secs = env_or_u64("FAIR_PARSER_TIMEOUT_SECS", cfg.parser.timeout_secs);
    cfg.parser.skip_normalizers =
        env_or_bool("FAIR_SKIP_NORMALIZERS", cfg.parser.skip_normalizers);
    cfg.discovery.patterns = env_or_csv("FAIR_DISCOVERY_PATTERNS", &cfg.discovery.patterns);
    cfg.batch.jobs = env_or_usize("FAIR_JOBS", cfg.batch.jobs);
}

pub fn load_config() -> Result<FairConfig> {
    let paths = paths::resolve_paths()?;
    let mut cfg = FairConfig::default();
    merge_file_config(&mut cfg, &paths.config_file)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
