use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

pub const RECORD_PREFIX: &str = "fair_parsed_";
pub const STRUCTURE_FILE: &str = "fair-structure.json";

#[derive(Debug, Clone)]
pub struct FairPaths {
    pub fair_home: PathBuf,
    pub config_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<FairPaths> {
    let home = required_home_dir()?;
    let fair_home = env_or_default_path("FAIR_HOME", home.join(".fairtool"));
    let default_config = dirs::config_dir()
        .map(|dir| dir.join("fairtool").join("fair.toml"))
        .unwrap_or_else(|| fair_home.join("fair.toml"));
    let config_file = env_or_default_path("FAIR_CONFIG_PATH", default_config);

    Ok(FairPaths {
        fair_home,
        config_file,
    })
}

pub fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("calculation")
        .to_string()
}

/// `--output` when given, otherwise the directory holding the source.
pub fn target_dir_for(source: &Path, output_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = output_dir {
        return dir.to_path_buf();
    }
    match source.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn record_path(target_dir: &Path, source: &Path) -> PathBuf {
    target_dir.join(format!("{RECORD_PREFIX}{}.json", source_stem(source)))
}

/// `fair-structure.json`, or `fair-structure_<stem>.json` when several
/// sources write into the same directory.
pub fn structure_path(target_dir: &Path, stem: &str, shared_dir: bool) -> PathBuf {
    if shared_dir {
        target_dir.join(format!("fair-structure_{stem}.json"))
    } else {
        target_dir.join(STRUCTURE_FILE)
    }
}

pub fn is_record_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(RECORD_PREFIX) && name.ends_with(".json"))
}

/// Stem of the original calculation file, recovered from a record name.
pub fn record_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix(RECORD_PREFIX)?.strip_suffix(".json")?;
    Some(stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_path_follows_naming_convention() {
        let got = record_path(Path::new("/out"), Path::new("/calc/run1/vasprun.xml"));
        assert_eq!(got, PathBuf::from("/out/fair_parsed_vasprun.json"));
        assert!(is_record_file(&got));
        assert_eq!(record_stem(&got).as_deref(), Some("vasprun"));
    }

    #[test]
    fn target_dir_defaults_to_source_parent() {
        assert_eq!(
            target_dir_for(Path::new("/calc/run1/vasprun.xml"), None),
            PathBuf::from("/calc/run1")
        );
        assert_eq!(
            target_dir_for(Path::new("vasprun.xml"), None),
            PathBuf::from(".")
        );
        assert_eq!(
            target_dir_for(Path::new("/calc/vasprun.xml"), Some(Path::new("/out"))),
            PathBuf::from("/out")
        );
    }

    #[test]
    fn structure_path_is_disambiguated_in_shared_dirs() {
        let dir = Path::new("/out");
        assert_eq!(structure_path(dir, "a", false), PathBuf::from("/out/fair-structure.json"));
        assert_eq!(
            structure_path(dir, "a", true),
            PathBuf::from("/out/fair-structure_a.json")
        );
    }

    #[test]
    fn non_record_files_are_rejected() {
        assert!(!is_record_file(Path::new("/x/vasprun.xml")));
        assert!(!is_record_file(Path::new("/x/fair_parsed_a.md")));
        assert_eq!(record_stem(Path::new("/x/other.json")), None);
    }
}
