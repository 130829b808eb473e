use serde_json::{Map, Value};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::FairError;
use crate::fair::config::ParserConfig;
use crate::fair::record::ArchiveRecord;
use crate::fair::util::{CommandOutcome, run_command_with_optional_timeout, truncate_with_ellipsis};

const SNIPPET_RADIUS: usize = 40;

/// Anything that can turn a calculation file into a raw archive.
///
/// `Ok(None)` means the source produced no data for the file; callers skip it.
pub trait ArchiveSource: Sync {
    fn fetch(&self, path: &Path) -> Result<Option<ArchiveRecord>, FairError>;
}

/// The `nomad parse` command line tool.
#[derive(Debug, Clone)]
pub struct NomadCli {
    pub bin: PathBuf,
    pub skip_normalizers: bool,
    pub timeout_secs: Option<u64>,
}

impl NomadCli {
    pub fn from_config(cfg: &ParserConfig) -> Self {
        Self {
            bin: PathBuf::from(&cfg.bin),
            skip_normalizers: cfg.skip_normalizers,
            timeout_secs: (cfg.timeout_secs > 0).then_some(cfg.timeout_secs),
        }
    }

    pub fn args_for(&self, path: &Path) -> Vec<String> {
        let mut args = vec!["parse".to_string()];
        if self.skip_normalizers {
            args.push("--skip-normalizers".to_string());
        }
        args.push("--show-archive".to_string());
        args.push("--show-metadata".to_string());
        args.push(path.display().to_string());
        args
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.bin.display(), args.join(" "))
    }
}

/// Resolve the parser binary: an existing path wins, otherwise look the
/// name up on PATH.
pub fn resolve_parser_bin(bin: &Path) -> Result<PathBuf, FairError> {
    if bin.exists() {
        return Ok(bin.to_path_buf());
    }
    which::which(bin).map_err(|err| {
        FairError::MissingParser(format!("{} not found in FAIR_PARSER_BIN or PATH: {err}", bin.display()))
    })
}

impl ArchiveSource for NomadCli {
    fn fetch(&self, path: &Path) -> Result<Option<ArchiveRecord>, FairError> {
        let bin = resolve_parser_bin(&self.bin)?;
        let args = self.args_for(path);
        let command = self.command_line(&args);
        log::debug!("running `{command}`");

        let mut cmd = Command::new(&bin);
        cmd.args(&args);
        let outcome = run_command_with_optional_timeout(&mut cmd, self.timeout_secs).map_err(|err| {
            FairError::ToolInvocation {
                command: command.clone(),
                status: "could not be started".to_string(),
                stderr: err.to_string(),
            }
        })?;

        let output = match outcome {
            CommandOutcome::Finished(output) => output,
            CommandOutcome::TimedOut { after_secs } => {
                return Err(FairError::ToolInvocation {
                    command,
                    status: format!("timed out after {after_secs}s"),
                    stderr: String::new(),
                });
            }
        };

        if !output.status.success() {
            return Err(FairError::ToolInvocation {
                command,
                status: format!("exited with {}", output.status),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match merge_json_stream(&stdout)? {
            Some(map) => ArchiveRecord::from_map(map).map(Some),
            None => Ok(None),
        }
    }
}

/// Decode every JSON object concatenated in `text` and shallow-merge them in
/// order. Later top-level keys overwrite earlier ones. Bare `NaN`,
/// `Infinity` and `-Infinity` tokens decode as `null`.
///
/// Returns `Ok(None)` for whitespace-only input.
pub fn merge_json_stream(text: &str) -> Result<Option<Map<String, Value>>, FairError> {
    let (clean, shifts) = null_non_finite(text);
    let trimmed = clean.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let lead = clean.len() - clean.trim_start().len();
    let at = |offset: usize| original_offset(&shifts, lead + offset);

    let mut merged = Map::new();
    let mut stream = serde_json::Deserializer::from_str(trimmed).into_iter::<Value>();
    loop {
        let start = stream.byte_offset();
        let next = match stream.next() {
            Some(next) => next,
            None => break,
        };
        match next {
            Ok(Value::Object(object)) => merged.extend(object),
            Ok(other) => {
                return Err(decode_error(
                    text,
                    at(start + leading_ws(&trimmed[start..])),
                    format!("expected a JSON object, found {}", value_kind(&other)),
                ));
            }
            Err(err) => {
                let offset = at(offset_of(trimmed, err.line(), err.column()));
                return Err(decode_error(text, offset, err.to_string()));
            }
        }
    }
    Ok(Some(merged))
}

const NON_FINITE: [(&str, &str); 3] = [
    ("-Infinity", "null     "),
    ("Infinity", "null    "),
    ("NaN", "null"),
];

/// Rewrite non-finite float tokens outside string literals to `null`.
/// `NaN` grows by one byte; the returned offsets (in the rewritten text)
/// mark where that happened so error offsets can be mapped back.
fn null_non_finite(text: &str) -> (Cow<'_, str>, Vec<usize>) {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut shifts = Vec::new();
    let (mut in_string, mut escaped) = (false, false);
    let (mut i, mut copied) = (0usize, 0usize);

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        let token = NON_FINITE
            .iter()
            .find(|(token, _)| bytes[i..].starts_with(token.as_bytes()));
        match token {
            Some((token, replacement)) => {
                out.push_str(&text[copied..i]);
                out.push_str(replacement);
                if replacement.len() > token.len() {
                    shifts.push(out.len());
                }
                i += token.len();
                copied = i;
            }
            None => i += 1,
        }
    }

    if copied == 0 {
        return (Cow::Borrowed(text), shifts);
    }
    out.push_str(&text[copied..]);
    (Cow::Owned(out), shifts)
}

fn original_offset(shifts: &[usize], offset: usize) -> usize {
    offset - shifts.iter().filter(|&&end| end <= offset).count()
}

fn leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Convert serde_json's 1-based line / column into a byte offset.
fn offset_of(text: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let mut offset = 0usize;
    for (idx, chunk) in text.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            return (offset + column.saturating_sub(1)).min(text.len());
        }
        offset += chunk.len();
    }
    text.len()
}

fn decode_error(text: &str, offset: usize, message: String) -> FairError {
    let offset = offset.min(text.len());
    let mut from = offset.saturating_sub(SNIPPET_RADIUS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (offset + SNIPPET_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    FairError::Decode {
        offset,
        message,
        snippet: truncate_with_ellipsis(&text[from..to], SNIPPET_RADIUS * 2),
    }
}
