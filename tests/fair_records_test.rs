use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn fair(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("fair");
    cmd.current_dir(root)
        .env("HOME", root)
        .env("FAIR_HOME", root.join("fair_home"))
        .env("FAIR_CONFIG_PATH", root.join("missing.toml"));
    cmd
}

fn write_record(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, serde_json::to_string_pretty(value).expect("encode")).expect("write record");
}

fn copper_record() -> Value {
    json!({
        "metadata": {"fair_parse_time": 1_700_000_000.25},
        "run": [{
            "calculation": [{
                "energy": {"total": {"value": -3.204353268e-18}},
                "band_gap": [{"value": [0.0]}],
                "scf_iteration": [{}, {}]
            }],
            "system": [{"atoms": {
                "labels": ["Cu"],
                "lattice_vectors": [[0.0, 1.8e-10, 1.8e-10], [1.8e-10, 0.0, 1.8e-10], [1.8e-10, 1.8e-10, 0.0]],
                "positions": [[0.0, 0.0, 0.0]]
            }}]
        }],
        "results": {"material": {"topology": [{
            "label": "conventional cell",
            "cell": {"a": 3.6e-10, "b": 3.6e-10, "c": 3.6e-10, "gamma": 1.5707963267948966},
            "atoms": {
                "labels": ["Cu", "Cu", "Cu", "Cu"],
                "lattice_vectors": [[3.6e-10, 0.0, 0.0], [0.0, 3.6e-10, 0.0], [0.0, 0.0, 3.6e-10]],
                "positions": [
                    [0.0, 0.0, 0.0], [0.0, 1.8e-10, 1.8e-10],
                    [1.8e-10, 0.0, 1.8e-10], [1.8e-10, 1.8e-10, 0.0]
                ]
            }
        }]}}
    })
}

#[test]
fn inspect_reports_display_units() {
    let tmp = tempdir().expect("tempdir");
    let record = tmp.path().join("calc/fair_parsed_vasprun.json");
    write_record(&record, &copper_record());

    fair(tmp.path())
        .arg("inspect")
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("topology[0].label=conventional cell"))
        .stdout(predicate::str::contains("topology[0].a=3.600 Å"))
        .stdout(predicate::str::contains("topology[0].gamma=90 °"))
        .stdout(predicate::str::contains("energy.total=-20.000000 eV"))
        .stdout(predicate::str::contains("band_gap=0.0000 eV"))
        .stdout(predicate::str::contains("scf_iterations=2"))
        .stdout(predicate::str::contains("parsed_at=2023-11-14T22:13:20.250Z"));
}

#[test]
fn inspect_rejects_non_record_files() {
    let tmp = tempdir().expect("tempdir");
    let other = tmp.path().join("vasprun.xml");
    fs::write(&other, "<modeling/>").expect("write");

    fair(tmp.path())
        .arg("inspect")
        .arg(&other)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a fair_parsed_*.json record"));
}

#[test]
fn structure_rebuilds_from_records_and_respects_force() {
    let tmp = tempdir().expect("tempdir");
    let record = tmp.path().join("calc/fair_parsed_vasprun.json");
    write_record(&record, &copper_record());
    let structure = tmp.path().join("calc/fair-structure.json");

    fair(tmp.path())
        .arg("structure")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("written="));
    let built: Value = serde_json::from_str(&fs::read_to_string(&structure).expect("read")).expect("json");
    assert_eq!(built["source"], "conventional_cell_topology");
    assert_eq!(built["sites"].as_array().map(Vec::len), Some(4));

    fair(tmp.path())
        .arg("structure")
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("exists="));

    fair(tmp.path())
        .args(["structure", "--force"])
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("written="));
}

#[test]
fn structure_reports_corrupt_records() {
    let tmp = tempdir().expect("tempdir");
    let record = tmp.path().join("fair_parsed_bad.json");
    fs::write(&record, "{ not json").expect("write");

    fair(tmp.path())
        .arg("structure")
        .arg(&record)
        .assert()
        .failure()
        .stdout(predicate::str::contains("issue:"));
}

#[test]
fn status_lists_resolved_config_and_env_overrides() {
    let tmp = tempdir().expect("tempdir");
    let config = tmp.path().join("fair.toml");
    fs::write(&config, "[batch]\njobs = 3\n").expect("write config");
    let parser = tmp.path().join("nomad");
    fs::write(&parser, "#!/usr/bin/env bash\nexit 0\n").expect("write parser");

    fair(tmp.path())
        .env("FAIR_CONFIG_PATH", &config)
        .env("FAIR_PARSER_BIN", &parser)
        .env_remove("FAIR_JOBS")
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"command\": \"status\""))
        .stdout(predicate::str::contains("batch.jobs=3"))
        .stdout(predicate::str::contains("FAIR_PARSER_BIN"));
}

#[test]
fn status_flags_invalid_config() {
    let tmp = tempdir().expect("tempdir");
    fair(tmp.path())
        .env("FAIR_JOBS", "0")
        .arg("status")
        .assert()
        .failure()
        .stdout(predicate::str::contains("config invalid"));
}

#[test]
fn inspect_field_filter_rejects_unknown_names() {
    let tmp = tempdir().expect("tempdir");
    let record = tmp.path().join("fair_parsed_vasprun.json");
    write_record(&record, &copper_record());

    fair(tmp.path())
        .args(["inspect", "--field", "a"])
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("topology[0].a=3.600 Å"))
        .stdout(predicate::str::contains("topology[0].gamma").not());

    fair(tmp.path())
        .args(["inspect", "--numeric", "--field", "gamma"])
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("topology[0].gamma=90\n"));

    fair(tmp.path())
        .args(["inspect", "--field", "density"])
        .arg(&record)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown field `density`"));
}
