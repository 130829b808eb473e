use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FairWarnCode;
use crate::fair::archive::ArchiveSource;
use crate::fair::cache::{self, CacheDecision};
use crate::fair::filter;
use crate::fair::persist::write_json_atomic;
use crate::fair::record::ArchiveRecord;
use crate::fair::structure::{self, SymmetryAnalyzer};
use crate::fair::util::now_epoch_f64;
use crate::fair::warn;

/// One calculation file and the artifacts it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub source: PathBuf,
    pub record_path: PathBuf,
    pub structure_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Skipped {
        record_path: PathBuf,
        parsed_at: f64,
    },
    Empty,
    Written {
        record_path: PathBuf,
        structure_path: Option<PathBuf>,
    },
}

/// Write the derived structure, or clear a structure left by an earlier run
/// when derivation is skipped so no record sits beside stale geometry.
fn write_structure(
    record: &ArchiveRecord,
    analyzer: &dyn SymmetryAnalyzer,
    origin: &Path,
    structure_path: &Path,
) -> Result<Option<PathBuf>> {
    match structure::derive(record, analyzer) {
        Ok(canonical) => {
            let written = write_json_atomic(structure_path, &canonical)?;
            log::debug!(
                "wrote {} sites ({}) to {}",
                canonical.sites.len(),
                canonical.formula,
                written.display()
            );
            Ok(Some(written))
        }
        Err(skipped) => {
            warn::emit(
                FairWarnCode::W002DerivationSkipped,
                "structure",
                &origin.display().to_string(),
                "no structure artifact written",
                &skipped.to_string(),
            );
            remove_stale(structure_path)?;
            Ok(None)
        }
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::info!("removed stale {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove stale {}", path.display())),
    }
}

/// Run one calculation file through fetch, filter, persist and derive.
///
/// A fresh record short-circuits the whole pipeline unless `force` is set.
/// Structure derivation failures only warn; the filtered record is still
/// written. The record goes to disk last: it is the freshness marker, so a
/// failed structure write leaves the file due for another run.
pub fn normalize_file(
    source: &dyn ArchiveSource,
    analyzer: &dyn SymmetryAnalyzer,
    job: &FileJob,
    force: bool,
) -> Result<FileOutcome> {
    match cache::decide(&job.source, &job.record_path, force) {
        CacheDecision::Skip {
            stored,
            source_mtime,
        } => {
            log::info!(
                "skipping {}: {} is up to date (parsed {stored} >= modified {source_mtime})",
                job.source.display(),
                job.record_path.display()
            );
            return Ok(FileOutcome::Skipped {
                record_path: job.record_path.clone(),
                parsed_at: stored,
            });
        }
        CacheDecision::Proceed(reason) => {
            log::debug!("processing {} ({reason})", job.source.display());
        }
    }

    let fetched = source
        .fetch(&job.source)
        .with_context(|| format!("failed to parse {}", job.source.display()))?;
    let Some(raw) = fetched else {
        warn::emit(
            FairWarnCode::W001EmptyOutput,
            "parse",
            &job.source.display().to_string(),
            "parser returned no data",
            "empty stdout",
        );
        return Ok(FileOutcome::Empty);
    };

    let record = filter::apply(raw, now_epoch_f64()?);
    let structure_path = write_structure(&record, analyzer, &job.source, &job.structure_path)?;
    let record_path = write_json_atomic(&job.record_path, &record)?;
    log::info!("wrote {}", record_path.display());

    Ok(FileOutcome::Written {
        record_path,
        structure_path,
    })
}

pub fn read_record(path: &Path) -> Result<ArchiveRecord> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let record = serde_json::from_str(&raw)
        .with_context(|| format!("failed to decode record {}", path.display()))?;
    Ok(record)
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructureOutcome {
    Exists(PathBuf),
    Written(PathBuf),
    Skipped,
}

/// Derive the structure artifact again from a persisted record.
pub fn rederive_structure(
    analyzer: &dyn SymmetryAnalyzer,
    record_path: &Path,
    structure_path: &Path,
    force: bool,
) -> Result<StructureOutcome> {
    if structure_path.exists() && !force {
        return Ok(StructureOutcome::Exists(structure_path.to_path_buf()));
    }
    let record = read_record(record_path)?;
    Ok(match write_structure(&record, analyzer, record_path, structure_path)? {
        Some(path) => StructureOutcome::Written(path),
        None => StructureOutcome::Skipped,
    })
}
