//! VarAnno Worker main executable

pub mod annos;
pub mod common;
pub mod conf;
pub mod err;
pub mod pipeline;
pub mod report;
pub mod workspace;

use std::process::{ExitCode, Termination};

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reads to annotated variant report",
    long_about = "This tool runs alignment, variant calling and annotation on FASTQ files \
                  and summarizes the annotated variants in a spreadsheet"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Pipeline-related commands.
    Pipeline(Pipeline),
    /// Annotation post-processing commands.
    Annos(Annos),
    /// Report-related commands.
    Report(Report),
}

/// Parsing of "pipeline *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Pipeline {
    /// The sub command to run
    #[command(subcommand)]
    command: PipelineCommands,
}

/// Enum supporting the parsing of "pipeline *" sub commands.
#[derive(Debug, Subcommand)]
enum PipelineCommands {
    Run(pipeline::Args),
}

/// Parsing of "annos *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Annos {
    /// The sub command to run
    #[command(subcommand)]
    command: AnnosCommands,
}

/// Enum supporting the parsing of "annos *" sub commands.
#[derive(Debug, Subcommand)]
enum AnnosCommands {
    Clean(annos::clean::Args),
}

/// Parsing of "report *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Report {
    /// The sub command to run
    #[command(subcommand)]
    command: ReportCommands,
}

/// Enum supporting the parsing of "report *" sub commands.
#[derive(Debug, Subcommand)]
enum ReportCommands {
    Build(report::Args),
}

fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Pipeline(pipeline) => match &pipeline.command {
                PipelineCommands::Run(args) => pipeline::run(&cli.common, args)?,
            },
            Commands::Annos(annos) => match &annos.command {
                AnnosCommands::Clean(args) => annos::clean::run(&cli.common, args)?,
            },
            Commands::Report(report) => match &report.command {
                ReportCommands::Build(args) => report::run(&cli.common, args)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            // Pass on the exit code of a failed external tool.
            match e.downcast::<err::StageError>() {
                Ok(stage_error) => stage_error.report(),
                Err(_) => ExitCode::FAILURE,
            }
        }
    }
}
