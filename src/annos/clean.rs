//! Implementation of `annos clean` subcommand.
//!
//! ANNOVAR copies the `##` meta lines of its VCF input into the CSV output
//! below the column header.  These lines are removed here so that the output
//! is a plain delimited table.

use std::{
    io::{BufRead, Write},
    path::Path,
};

use thousands::Separable;

use crate::common::{self, open_read_maybe_gz};

/// Prefix of the lines to drop.
pub const META_PREFIX: &[u8] = b"##";

/// Command line arguments for `annos clean` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "strip meta lines from ANNOVAR CSV output", long_about = None)]
pub struct Args {
    /// Path to the raw ANNOVAR CSV file.
    #[clap(long)]
    pub path_input: String,
    /// Path to the cleaned output CSV file.
    #[clap(long)]
    pub path_output: String,
}

/// Number of lines kept and dropped by cleaning.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    pub kept: usize,
    pub dropped: usize,
}

/// Copy `reader` to `writer`, dropping all lines after the first one that
/// start with `##`.
///
/// Lines are copied byte for byte including their terminators.  A data line
/// starting with `##` cannot be told apart from a meta line and is dropped
/// as well.
pub fn clean<R, W>(reader: &mut R, writer: &mut W) -> Result<CleanStats, anyhow::Error>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let mut stats = CleanStats::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if stats.kept > 0 && line.starts_with(META_PREFIX) {
            stats.dropped += 1;
        } else {
            writer.write_all(&line)?;
            stats.kept += 1;
        }
    }
    writer.flush()?;
    Ok(stats)
}

/// Clean the file at `path_input` into `path_output`.
pub fn clean_file<P, Q>(path_input: P, path_output: Q) -> Result<CleanStats, anyhow::Error>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut reader = open_read_maybe_gz(path_input.as_ref()).map_err(|e| {
        anyhow::anyhow!("could not open {:?} for reading: {}", path_input.as_ref(), e)
    })?;
    let mut writer = common::open_write_maybe_gz(path_output.as_ref()).map_err(|e| {
        anyhow::anyhow!("could not open {:?} for writing: {}", path_output.as_ref(), e)
    })?;
    let stats = clean(&mut reader, &mut writer)?;
    tracing::debug!(
        "kept {} lines, dropped {} meta lines",
        stats.kept.separate_with_commas(),
        stats.dropped.separate_with_commas()
    );
    Ok(stats)
}

/// Main entry point for `annos clean` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let stats = clean_file(&args.path_input, &args.path_output)?;
    tracing::info!(
        "wrote {} lines, dropped {}",
        stats.kept.separate_with_commas(),
        stats.dropped.separate_with_commas()
    );

    tracing::info!(
        "All of `annos clean` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}
