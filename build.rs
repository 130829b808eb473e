use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

/// A whole string literal naming a `FAIR_*` environment key.
fn is_env_key(literal: &str) -> bool {
    literal.len() > "FAIR_".len()
        && literal.starts_with("FAIR_")
        && literal
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Keys read by non-test code. Environment lookups always go through a quoted
/// key, so every quote-delimited piece of a source file is a candidate.
fn fair_env_keys() -> BTreeSet<String> {
    WalkDir::new("src")
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .filter_map(|entry| fs::read_to_string(entry.path()).ok())
        .flat_map(|source| {
            let code = source.split("#[cfg(test)]").next().unwrap_or_default().to_string();
            code.split('"')
                .filter(|piece| is_env_key(piece))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn main() {
    let keys: Vec<String> = fair_env_keys().into_iter().map(|key| format!("    \"{key}\",\n")).collect();
    let generated = format!(
        "pub const GENERATED_FAIR_ENV_ALLOWLIST: &[&str] = &[\n{}];\n",
        keys.concat()
    );
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(Path::new(&out_dir).join("fair_env_allowlist.rs"), generated)
        .expect("failed to generate FAIR env allowlist");

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock before unix epoch");
    println!("cargo:rustc-env=BUILD_UUID={:x}-{:x}", now.as_secs(), now.subsec_nanos());
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
