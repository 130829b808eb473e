//! Reduces a merged archive to the stable record that gets persisted.
//!
//! The removal set is fixed. Every removal is remove-if-present, so applying
//! the filter to an already filtered record changes nothing but the stamp.

use serde_json::Value;

use crate::fair::record::{ArchiveRecord, Calculation, Field, Method, Metadata, Run};

pub const TOP_LEVEL_REMOVALS: [&str; 10] = [
    "entry_name",
    "entry_type",
    "mainfile",
    "domain",
    "n_quantities",
    "quantities",
    "optimade",
    "sections",
    "section_defs",
    "workflow2",
];

pub const METADATA_REMOVALS: [&str; 4] = ["n_quantities", "quantities", "sections", "section_defs"];

/// Apply the removal set and stamp `metadata.fair_parse_time = parsed_at`.
pub fn apply(archive: ArchiveRecord, parsed_at: f64) -> ArchiveRecord {
    let ArchiveRecord {
        metadata,
        run,
        results,
        mut extra,
    } = archive;

    for key in TOP_LEVEL_REMOVALS {
        extra.remove(key);
    }

    let mut metadata = filter_metadata(metadata.into_option().unwrap_or_default());
    metadata.fair_parse_time = Field::Present(parsed_at);

    ArchiveRecord {
        metadata: Field::Present(metadata),
        run: field_map(run, |runs| runs.into_iter().map(filter_run).collect()),
        results,
        extra,
    }
}

fn field_map<T>(field: Field<T>, f: impl FnOnce(T) -> T) -> Field<T> {
    match field {
        Field::Present(v) => Field::Present(f(v)),
        other => other,
    }
}

fn filter_metadata(mut metadata: Metadata) -> Metadata {
    for key in METADATA_REMOVALS {
        metadata.extra.remove(key);
    }
    metadata
}

fn filter_run(run: Run) -> Run {
    Run {
        method: field_map(run.method, |methods| methods.into_iter().map(filter_method).collect()),
        calculation: field_map(run.calculation, |calcs| {
            calcs.into_iter().map(filter_calculation).collect()
        }),
        ..run
    }
}

fn filter_method(mut method: Method) -> Method {
    if let Some(Value::Object(points)) = method
        .k_mesh
        .as_option_mut()
        .and_then(|k_mesh| k_mesh.points.as_option_mut())
    {
        points.remove("im");
    }
    method
}

fn filter_calculation(calculation: Calculation) -> Calculation {
    Calculation {
        dos_electronic: Field::Absent,
        eigenvalues: Field::Absent,
        ..calculation
    }
}
