use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{FairError, FairWarnCode};
use crate::fair::archive::ArchiveSource;
use crate::fair::paths;
use crate::fair::pipeline::{self, FileJob, FileOutcome};
use crate::fair::structure::SymmetryAnalyzer;
use crate::fair::warn;

#[derive(Debug, Default)]
pub struct BatchPlan {
    pub jobs: Vec<FileJob>,
    pub rejected: Vec<(PathBuf, FairError)>,
}

/// Map every source to its artifact paths. Sources sharing a target
/// directory get per-stem structure files; a source whose record path is
/// already taken by an earlier one is rejected.
pub fn plan(sources: &[PathBuf], output_dir: Option<&Path>) -> BatchPlan {
    let mut per_dir: HashMap<PathBuf, usize> = HashMap::new();
    for source in sources {
        *per_dir.entry(paths::target_dir_for(source, output_dir)).or_default() += 1;
    }

    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut out = BatchPlan::default();
    for source in sources {
        let target_dir = paths::target_dir_for(source, output_dir);
        let record_path = paths::record_path(&target_dir, source);
        if let Some(first) = claimed.get(&record_path) {
            warn::emit(
                FairWarnCode::W004OutputCollision,
                "plan",
                &source.display().to_string(),
                "record path already claimed",
                &first.display().to_string(),
            );
            out.rejected.push((
                source.clone(),
                FairError::OutputCollision(format!(
                    "{} and {} both map to {}",
                    first.display(),
                    source.display(),
                    record_path.display()
                )),
            ));
            continue;
        }
        claimed.insert(record_path.clone(), source.clone());

        let shared = per_dir.get(&target_dir).copied().unwrap_or(0) > 1;
        let structure_path = paths::structure_path(&target_dir, &paths::source_stem(source), shared);
        out.jobs.push(FileJob {
            source: source.clone(),
            record_path,
            structure_path,
        });
    }
    out
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub success: usize,
    pub skipped: usize,
    pub empty: usize,
    pub failed: usize,
    pub failures: BTreeMap<String, String>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.empty + self.failed
    }

    fn record(&mut self, source: &Path, result: Result<FileOutcome>) {
        match result {
            Ok(FileOutcome::Written { .. }) => self.success += 1,
            Ok(FileOutcome::Skipped { .. }) => self.skipped += 1,
            Ok(FileOutcome::Empty) => self.empty += 1,
            Err(err) => {
                log::error!("{}: {err:#}", source.display());
                self.failed += 1;
                self.failures.insert(source.display().to_string(), format!("{err:#}"));
            }
        }
    }
}

/// Run a plan on `jobs` worker threads. Per-file failures are counted, never
/// propagated; only a pool that cannot be built is an error.
pub fn run(
    source: &dyn ArchiveSource,
    analyzer: &dyn SymmetryAnalyzer,
    plan: BatchPlan,
    jobs: usize,
    force: bool,
) -> Result<BatchSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|idx| format!("fair-worker-{idx}"))
        .build()
        .context("failed to start worker pool")?;

    let results: Vec<(PathBuf, Result<FileOutcome>)> = pool.install(|| {
        plan.jobs
            .par_iter()
            .map(|job| {
                let result = pipeline::normalize_file(source, analyzer, job, force);
                (job.source.clone(), result)
            })
            .collect()
    });

    let mut summary = BatchSummary::default();
    for (source, err) in plan.rejected {
        summary.record(&source, Err(err.into()));
    }
    for (source, result) in results {
        summary.record(&source, result);
    }
    Ok(summary)
}
