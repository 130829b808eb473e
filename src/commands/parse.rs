use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::PathBuf;

use crate::commands::{CommandReport, confirm};
use crate::fair::archive::{NomadCli, resolve_parser_bin};
use crate::fair::batch;
use crate::fair::config::load_config;
use crate::fair::discovery;
use crate::fair::pipeline::{self, FileOutcome};
use crate::fair::symmetry::CentringAnalyzer;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub input: PathBuf,
    pub recursive: bool,
    pub output: Option<PathBuf>,
    pub force: bool,
    pub yes: bool,
    pub jobs: Option<usize>,
}

fn describe(report: &mut CommandReport, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Written {
            record_path,
            structure_path,
        } => {
            report.detail(format!("record={}", record_path.display()));
            match structure_path {
                Some(path) => report.detail(format!("structure={}", path.display())),
                None => report.detail("structure=skipped"),
            }
        }
        FileOutcome::Skipped {
            record_path,
            parsed_at,
        } => {
            report.detail(format!("skipped={} (parsed_at={parsed_at})", record_path.display()));
        }
        FileOutcome::Empty => report.detail("empty=parser returned no data"),
    }
}

pub fn run(opts: &ParseOptions) -> Result<CommandReport> {
    let cfg = load_config()?;
    let mut report = CommandReport::new("parse");

    let jobs = opts.jobs.unwrap_or(cfg.batch.jobs);
    if jobs == 0 {
        return Err(anyhow!("--jobs must be >= 1"));
    }
    if !opts.input.exists() {
        return Err(anyhow!("input path does not exist: {}", opts.input.display()));
    }
    if let Some(dir) = &opts.output {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let source = NomadCli::from_config(&cfg.parser);
    let analyzer = CentringAnalyzer;

    if opts.input.is_file() {
        let prompt = format!("Proceed to process the file {}?", opts.input.display());
        if !confirm(&prompt, opts.yes)? {
            report.detail("aborted by user");
            return Ok(report);
        }
        resolve_parser_bin(&source.bin)?;
        let plan = batch::plan(std::slice::from_ref(&opts.input), opts.output.as_deref());
        let job = plan
            .jobs
            .first()
            .ok_or_else(|| anyhow!("no job planned for {}", opts.input.display()))?;
        let outcome = pipeline::normalize_file(&source, &analyzer, job, opts.force)?;
        describe(&mut report, &outcome);
        return Ok(report);
    }

    let files = discovery::find_calc_files(&opts.input, &cfg.discovery.patterns, opts.recursive)?;
    if files.is_empty() {
        log::warn!("no calculation files found in {}", opts.input.display());
        report.detail(format!(
            "no files matching {} in {}",
            cfg.discovery.patterns.join(","),
            opts.input.display()
        ));
        return Ok(report);
    }

    log::info!("found {} calculation file(s)", files.len());
    for (dir, names) in discovery::group_by_dir(&files) {
        log::info!(" - {}: {}", dir.display(), names.join(", "));
    }
    let prompt = format!("Proceed to process all {} file(s)?", files.len());
    if !confirm(&prompt, opts.yes)? {
        report.detail("aborted by user");
        return Ok(report);
    }
    resolve_parser_bin(&source.bin)?;

    let summary = batch::run(
        &source,
        &analyzer,
        batch::plan(&files, opts.output.as_deref()),
        jobs,
        opts.force,
    )?;
    report.detail(format!("jobs={jobs}"));
    report.detail(format!("total={}", summary.total()));
    report.detail(format!("success={}", summary.success));
    report.detail(format!("skipped={}", summary.skipped));
    report.detail(format!("empty={}", summary.empty));
    report.detail(format!("failed={}", summary.failed));
    for (source, err) in &summary.failures {
        report.issue(format!("{source}: {err}"));
    }
    Ok(report)
}
