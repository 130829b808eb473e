use anyhow::{Result, anyhow};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "fair",
    version,
    about = "Normalize electronic-structure calculations into FAIR records and canonical structures"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse calculation files into fair_parsed_*.json records.
    Parse(ParseArgs),
    /// Re-derive canonical structures from existing records.
    Structure(StructureArgs),
    /// Summarize a record in display units.
    Inspect(InspectArgs),
    /// Show resolved configuration and parser availability.
    Status,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Calculation file or directory to search.
    #[arg(default_value = ".")]
    input: PathBuf,
    /// Search subdirectories too.
    #[arg(short, long)]
    recursive: bool,
    /// Directory for outputs; defaults to each source's directory.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Reprocess even when the record is up to date.
    #[arg(short, long)]
    force: bool,
    /// Do not ask for confirmation.
    #[arg(short, long)]
    yes: bool,
    /// Worker threads for directory batches.
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(Debug, Args)]
struct StructureArgs {
    /// Record file or directory of records.
    input: PathBuf,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Overwrite existing structure files.
    #[arg(short, long)]
    force: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// A fair_parsed_*.json record.
    input: PathBuf,
    /// Only report these cell fields (repeatable).
    #[arg(long = "field", value_name = "NAME")]
    fields: Vec<String>,
    /// Print cell values without unit symbols.
    #[arg(long)]
    numeric: bool,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = match cli.command {
        Command::Parse(args) => commands::parse::run(&commands::parse::ParseOptions {
            input: args.input,
            recursive: args.recursive,
            output: args.output,
            force: args.force,
            yes: args.yes,
            jobs: args.jobs,
        })?,
        Command::Structure(args) => commands::structure::run(&commands::structure::StructureOptions {
            input: args.input,
            output: args.output,
            force: args.force,
        })?,
        Command::Inspect(args) => commands::inspect::run(&args.input, &args.fields, args.numeric)?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        return Err(anyhow!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_defaults_to_current_directory() {
        let cli = Cli::try_parse_from(["fair", "parse", "-y"]).expect("parse");
        let Command::Parse(args) = cli.command else {
            panic!("expected parse");
        };
        assert_eq!(args.input, PathBuf::from("."));
        assert!(args.yes);
        assert!(!args.recursive);
        assert_eq!(args.jobs, None);
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from(["fair", "inspect", "x.json", "--json", "-vv"]).expect("parse");
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }
}
