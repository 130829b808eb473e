use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::FairWarnCode;
use crate::fair::util::modified_epoch_f64;
use crate::fair::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheDecision {
    Skip { stored: f64, source_mtime: f64 },
    Proceed(ProceedReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProceedReason {
    Forced,
    NoOutput,
    Unreadable(String),
    MissingTimestamp,
    Stale { stored: f64, source_mtime: f64 },
    SourceMtimeUnavailable(String),
}

impl std::fmt::Display for ProceedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::NoOutput => write!(f, "no previous output"),
            Self::Unreadable(err) => write!(f, "previous output unreadable: {err}"),
            Self::MissingTimestamp => write!(f, "previous output has no fair_parse_time"),
            Self::Stale {
                stored,
                source_mtime,
            } => write!(f, "source modified after last parse ({source_mtime} > {stored})"),
            Self::SourceMtimeUnavailable(err) => write!(f, "source mtime unavailable: {err}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    metadata: Option<StoredMetadata>,
}

#[derive(Debug, Deserialize)]
struct StoredMetadata {
    #[serde(default)]
    fair_parse_time: Option<serde_json::Value>,
}

/// The comparison itself: skip only when a stored timestamp exists and is
/// not older than the source.
pub fn decide_from(stored: Option<f64>, source_mtime: f64, force: bool) -> CacheDecision {
    if force {
        return CacheDecision::Proceed(ProceedReason::Forced);
    }
    match stored {
        None => CacheDecision::Proceed(ProceedReason::MissingTimestamp),
        Some(stored) if stored >= source_mtime => CacheDecision::Skip {
            stored,
            source_mtime,
        },
        Some(stored) => CacheDecision::Proceed(ProceedReason::Stale {
            stored,
            source_mtime,
        }),
    }
}

/// Read `metadata.fair_parse_time` from a previously written record.
pub fn stored_parse_time(output: &Path) -> Result<Option<f64>, String> {
    let raw = fs::read_to_string(output).map_err(|err| err.to_string())?;
    let parsed: StoredRecord = serde_json::from_str(&raw).map_err(|err| err.to_string())?;
    Ok(parsed
        .metadata
        .and_then(|m| m.fair_parse_time)
        .and_then(|v| v.as_f64()))
}

/// Decide whether `source` needs to be normalized again into `output`.
/// Every failure resolves to `Proceed`.
pub fn decide(source: &Path, output: &Path, force: bool) -> CacheDecision {
    if force {
        return CacheDecision::Proceed(ProceedReason::Forced);
    }
    if !output.exists() {
        return CacheDecision::Proceed(ProceedReason::NoOutput);
    }

    let stored = match stored_parse_time(output) {
        Ok(stored) => stored,
        Err(err) => {
            warn::emit(
                FairWarnCode::W003CacheUnreadable,
                "cache",
                &source.display().to_string(),
                "existing output unreadable; recomputing",
                &err,
            );
            return CacheDecision::Proceed(ProceedReason::Unreadable(err));
        }
    };

    let source_mtime = match modified_epoch_f64(source) {
        Ok(mtime) => mtime,
        Err(err) => {
            return CacheDecision::Proceed(ProceedReason::SourceMtimeUnavailable(format!("{err:#}")));
        }
    };

    decide_from(stored, source_mtime, false)
}
