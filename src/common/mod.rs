//! Common functionality.

pub mod io;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub use io::{open_read_maybe_gz, open_write_maybe_gz};

/// Commonly used command line arguments.
#[derive(Parser, Debug, Default)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// Helper to print the current memory resident set size via `tracing`.
///
/// Reading `/proc` may fail (e.g., on non-Linux systems), in which case this
/// is only logged.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(rss) => tracing::debug!("RSS now: {}", bytesize::ByteSize::b(rss)),
        Err(e) => tracing::trace!("could not determine RSS: {}", e),
    }
}

/// Return the version of the `varanno-worker` crate and `x.y.z` in tests.
pub fn worker_version() -> &'static str {
    if cfg!(test) {
        "x.y.z"
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Expand `~` and environment variables in a path given in configuration or
/// on the command line.
pub fn expand_path(path: &str) -> Result<std::path::PathBuf, anyhow::Error> {
    shellexpand::full(path)
        .map(|expanded| std::path::PathBuf::from(expanded.as_ref()))
        .map_err(|e| anyhow::anyhow!("could not expand path {:?}: {}", path, e))
}
