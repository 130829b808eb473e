use anyhow::{Context, Result, anyhow};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::FairError;
use crate::fair::paths;

/// One matcher for all configured file name patterns. Blank entries are
/// ignored; an unparsable pattern is a config error.
pub fn build_matcher(patterns: &[String]) -> Result<GlobSet, FairError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let glob = Glob::new(pattern).map_err(|err| {
            FairError::InvalidConfig(format!("invalid discovery pattern '{pattern}': {err}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| FairError::InvalidConfig(format!("discovery globset build failed: {err}")))
}

fn walk(root: &Path, recursive: bool) -> WalkDir {
    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if recursive { walker } else { walker.max_depth(1) }
}

fn collect_files<F>(root: &Path, recursive: bool, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut found = BTreeSet::new();
    for entry in walk(root, recursive) {
        let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
        if entry.file_type().is_file() && keep(entry.path()) {
            found.insert(entry.into_path());
        }
    }
    Ok(found.into_iter().collect())
}

/// Calculation files under `root` whose names match any of `patterns`,
/// deduplicated and sorted.
pub fn find_calc_files(root: &Path, patterns: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(anyhow!("input path does not exist: {}", root.display()));
    }
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let matcher = build_matcher(patterns)?;
    collect_files(root, recursive, |path| {
        path.file_name().is_some_and(|name| matcher.is_match(name))
    })
}

/// `fair_parsed_*.json` records under `root`. A file input is returned only
/// when it follows the record naming convention.
pub fn find_record_files(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(anyhow!("input path does not exist: {}", root.display()));
    }
    if root.is_file() {
        if paths::is_record_file(root) {
            return Ok(vec![root.to_path_buf()]);
        }
        log::warn!("{} is not a fair_parsed_*.json file; skipping", root.display());
        return Ok(Vec::new());
    }
    collect_files(root, recursive, paths::is_record_file)
}

/// Files grouped by parent directory, for the pre-run listing.
pub fn group_by_dir(files: &[PathBuf]) -> BTreeMap<PathBuf, Vec<String>> {
    let mut out: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for file in files {
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.entry(dir).or_default().push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, "<modeling/>").expect("write");
    }

    fn matcher(patterns: &[&str]) -> GlobSet {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        build_matcher(&owned).expect("matcher")
    }

    #[test]
    fn wildcard_matching() {
        assert!(matcher(&["vasprun.xml"]).is_match("vasprun.xml"));
        let suffix = matcher(&["*vasprun.xml"]);
        assert!(suffix.is_match("relax_vasprun.xml"));
        assert!(suffix.is_match("vasprun.xml"));
        assert!(!suffix.is_match("vasprun.xml.bak"));
        assert!(matcher(&["OUTCAR?"]).is_match("OUTCAR1"));
        assert!(matcher(&["a*b*c"]).is_match("aXXbYYc"));
        assert!(!matcher(&["a*b*c"]).is_match("aXXbYY"));
        assert!(matcher(&["", "  "]).is_empty());
    }

    #[test]
    fn unparsable_pattern_is_a_config_error() {
        let err = build_matcher(&["vasprun[.xml".to_string()]).expect_err("invalid");
        assert!(matches!(err, FairError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn non_recursive_search_stays_at_top_level() {
        let tmp = tempdir().expect("tempdir");
        touch(&tmp.path().join("vasprun.xml"));
        touch(&tmp.path().join("scf_vasprun.xml"));
        touch(&tmp.path().join("nested/vasprun.xml"));
        touch(&tmp.path().join("notes.txt"));

        let patterns = vec!["vasprun.xml".to_string(), "*vasprun.xml".to_string()];
        let flat = find_calc_files(tmp.path(), &patterns, false).expect("flat");
        assert_eq!(flat.len(), 2, "duplicates across patterns collapse: {flat:?}");

        let deep = find_calc_files(tmp.path(), &patterns, true).expect("deep");
        assert_eq!(deep.len(), 3);
        assert!(deep.windows(2).all(|w| w[0] < w[1]), "sorted");

        let groups = group_by_dir(&deep);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&tmp.path().join("nested")], vec!["vasprun.xml"]);
    }

    #[test]
    fn record_search_only_returns_records() {
        let tmp = tempdir().expect("tempdir");
        touch(&tmp.path().join("a/fair_parsed_vasprun.json"));
        touch(&tmp.path().join("a/fair-structure.json"));
        touch(&tmp.path().join("b/fair_parsed_relax.json"));

        let records = find_record_files(tmp.path(), true).expect("records");
        assert_eq!(records.len(), 2);

        let single = find_record_files(&tmp.path().join("a/fair-structure.json"), true).expect("single");
        assert!(single.is_empty());
    }

    #[test]
    fn missing_input_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        assert!(find_calc_files(&tmp.path().join("nope"), &[], false).is_err());
    }
}
