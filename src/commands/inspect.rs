use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat};
use serde_json::Value;
use std::path::Path;

use crate::commands::CommandReport;
use crate::fair::paths;
use crate::fair::pipeline::read_record;
use crate::fair::record::ArchiveRecord;
use crate::fair::units::{CellField, UnknownField, convert, raw_scalar};

pub const J_PER_EV: f64 = 1.602_176_634e-19;

fn joules_to_ev(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Object(map) => map.get("value").and_then(raw_scalar),
        other => raw_scalar(other),
    }?;
    Some(raw / J_PER_EV)
}

fn rfc3339(epoch: f64) -> Option<String> {
    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Cell fields named on the command line; all of them when none are given.
pub fn select_fields(names: &[String]) -> Result<Vec<CellField>, UnknownField> {
    if names.is_empty() {
        return Ok(CellField::ALL.to_vec());
    }
    names.iter().map(|name| name.trim().parse::<CellField>()).collect()
}

/// `numeric` drops the unit symbol from cell values.
pub fn describe_record(
    report: &mut CommandReport,
    record: &ArchiveRecord,
    fields: &[CellField],
    numeric: bool,
) {
    match record.parse_time().and_then(rfc3339) {
        Some(stamp) => report.detail(format!("parsed_at={stamp}")),
        None => report.detail("parsed_at=unknown"),
    }

    for (idx, entry) in record.topology().iter().enumerate() {
        let label = entry.normalized_label().unwrap_or_else(|| "unlabelled".to_string());
        report.detail(format!("topology[{idx}].label={label}"));
        let Some(cell) = entry.cell.as_option() else {
            continue;
        };
        for &field in fields {
            let Some(raw) = cell.get(field.name()) else {
                continue;
            };
            let shown = match convert(raw, field) {
                Some(converted) if numeric => converted.number().to_string(),
                Some(converted) => converted.display,
                None => {
                    log::debug!("{field} has no usable value ({})", field.descriptor());
                    format!("unavailable ({})", field.descriptor().source_unit)
                }
            };
            report.detail(format!("topology[{idx}].{field}={shown}"));
        }
    }

    let Some(calc) = record.first_calculation() else {
        report.detail("calculation=none");
        return;
    };
    if let Some(energy) = calc.energy.as_option() {
        for (name, value) in energy {
            if let Some(ev) = joules_to_ev(value) {
                report.detail(format!("energy.{name}={ev:.6} eV"));
            }
        }
    }
    if let Some(gap) = calc
        .band_gap
        .as_option()
        .and_then(|gaps| gaps.first())
        .and_then(joules_to_ev)
    {
        report.detail(format!("band_gap={gap:.4} eV"));
    }
    let scf = calc.scf_iteration.as_option().map(Vec::len).unwrap_or(0);
    report.detail(format!("scf_iterations={scf}"));
}

pub fn run(input: &Path, field_names: &[String], numeric: bool) -> Result<CommandReport> {
    let fields = select_fields(field_names)?;
    if !paths::is_record_file(input) {
        return Err(anyhow!(
            "{} is not a fair_parsed_*.json record",
            input.display()
        ));
    }
    let record = read_record(input)?;
    let mut report = CommandReport::new("inspect");
    report.detail(format!("record={}", input.display()));
    describe_record(&mut report, &record, &fields, numeric);
    Ok(report)
}
