use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `value` as indented JSON with a trailing newline. The document is
/// staged in a temp file next to `path` and renamed into place, so readers
/// see either the old file or the complete new one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf> {
    let data = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let mut staged = NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to stage a temp file in {}", parent.display()))?;
    staged
        .write_all(data.as_bytes())
        .and_then(|_| staged.write_all(b"\n"))
        .and_then(|_| staged.as_file().sync_all())
        .with_context(|| format!("failed to write {}", path.display()))?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move staged output to {}", path.display()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn writes_pretty_json_with_trailing_newline() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("nested/out.json");
        write_json_atomic(&path, &json!({"metadata": {"fair_parse_time": 1.5}})).expect("write");
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.ends_with("}\n"));
        assert!(raw.contains("\n  \"metadata\""));
        let entries: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .collect();
        assert_eq!(entries.len(), 1, "no staged leftovers");
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let tmp = tempdir().expect("tempdir");
        let target = tmp.path().join("occupied");
        fs::create_dir_all(target.join("child")).expect("mkdir");

        let err = write_json_atomic(&target, &json!({"x": 1})).expect_err("cannot replace a dir");
        assert!(format!("{err:#}").contains("failed to move staged output"));
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("occupied")]);
    }
}
