use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::CommandReport;
use crate::fair::discovery;
use crate::fair::paths;
use crate::fair::pipeline::{self, StructureOutcome};
use crate::fair::symmetry::CentringAnalyzer;

#[derive(Debug, Clone)]
pub struct StructureOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub force: bool,
}

fn structure_targets(records: &[PathBuf], output: Option<&Path>) -> Vec<(PathBuf, PathBuf)> {
    let mut per_dir: HashMap<PathBuf, usize> = HashMap::new();
    for record in records {
        *per_dir.entry(paths::target_dir_for(record, output)).or_default() += 1;
    }
    records
        .iter()
        .map(|record| {
            let dir = paths::target_dir_for(record, output);
            let stem = paths::record_stem(record).unwrap_or_else(|| paths::source_stem(record));
            let shared = per_dir.get(&dir).copied().unwrap_or(0) > 1;
            (record.clone(), paths::structure_path(&dir, &stem, shared))
        })
        .collect()
}

fn one(record: &Path, target: &Path, force: bool) -> CommandReport {
    let mut report = CommandReport::new("structure");
    match pipeline::rederive_structure(&CentringAnalyzer, record, target, force) {
        Ok(StructureOutcome::Written(path)) => report.detail(format!("written={}", path.display())),
        Ok(StructureOutcome::Exists(path)) => {
            report.detail(format!("exists={} (use --force to rebuild)", path.display()))
        }
        Ok(StructureOutcome::Skipped) => {
            report.detail(format!("skipped={} (no usable cell)", record.display()))
        }
        Err(err) => report.issue(format!("{}: {err:#}", record.display())),
    }
    report
}

pub fn run(opts: &StructureOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("structure");
    if let Some(dir) = &opts.output {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let records = discovery::find_record_files(&opts.input, true)?;
    if records.is_empty() {
        report.detail(format!("no fair_parsed_*.json records in {}", opts.input.display()));
        return Ok(report);
    }

    report.detail(format!("records={}", records.len()));
    for (record, target) in structure_targets(&records, opts.output.as_deref()) {
        report.merge(one(&record, &target, opts.force));
    }
    Ok(report)
}
