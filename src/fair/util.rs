use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in fractional seconds.
///
/// This is the clock used for `metadata.fair_parse_time`; keep a single
/// implementation so the cache comparison stays consistent.
pub fn now_epoch_f64() -> Result<f64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?
        .as_secs_f64())
}

pub fn modified_epoch_f64(path: &Path) -> Result<f64> {
    let meta = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let modified = meta
        .modified()
        .with_context(|| format!("mtime unavailable for {}", path.display()))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .context("file mtime is before UNIX_EPOCH")?
        .as_secs_f64())
}

/// Truncate `input` to at most `max_chars` Unicode characters, stripping
/// control characters and appending `…` when truncated.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        clean
    }
}

#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug)]
pub enum CommandOutcome {
    Finished(CapturedOutput),
    TimedOut { after_secs: u64 },
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf);
        }
        buf
    })
}

/// Run `cmd`, capturing both streams. Pipes are drained on background threads
/// while waiting so a child writing more than the pipe buffer cannot stall.
pub fn run_command_with_optional_timeout(
    cmd: &mut Command,
    timeout_secs: Option<u64>,
) -> io::Result<CommandOutcome> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(limit) = timeout_secs {
            if started.elapsed() >= Duration::from_secs(limit) {
                let _ = child.kill();
                let _ = child.wait();
                // Grandchildren may still hold the pipes; leave the drain threads detached.
                drop((stdout, stderr));
                return Ok(CommandOutcome::TimedOut { after_secs: limit });
            }
        }
        thread::sleep(Duration::from_millis(20));
    };

    Ok(CommandOutcome::Finished(CapturedOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    }))
}
