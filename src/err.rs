//! Error types for the failure classes of a pipeline run.

use std::{
    path::PathBuf,
    process::{ExitCode, Termination},
    time::Duration,
};

use crate::pipeline::stage::StageName;

/// Problems with the submitted read files, raised before a run is created.
#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("no read files given")]
    NoReadFiles,
    #[error("invalid file type: {0:?}, only FASTQ files are allowed")]
    DisallowedSuffix(PathBuf),
    #[error("read file {0:?} does not exist")]
    NotFound(PathBuf),
}

/// Failure to allocate the per-run output directory.
#[derive(thiserror::Error, Debug)]
pub enum WorkspaceError {
    #[error("could not create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no unused run directory below {root:?} after {attempts} attempts")]
    Exhausted { root: PathBuf, attempts: usize },
}

/// Failure of one stage of the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("stage `{stage}`: could not launch `{program}`: {source}")]
    Launch {
        stage: StageName,
        program: String,
        source: std::io::Error,
    },
    #[error("stage `{stage}`: `{program}` failed with {status}")]
    Failed {
        stage: StageName,
        program: String,
        code: Option<i32>,
        status: String,
    },
    #[error("stage `{stage}`: timed out after {timeout:?}")]
    Timeout { stage: StageName, timeout: Duration },
    #[error("stage `{stage}`: expected output {path:?} is missing or empty")]
    MissingOutput { stage: StageName, path: PathBuf },
    #[error("stage `{stage}`: I/O error: {source}")]
    Io {
        stage: StageName,
        source: std::io::Error,
    },
}

impl StageError {
    /// The stage that failed.
    pub fn stage(&self) -> StageName {
        match self {
            StageError::Launch { stage, .. }
            | StageError::Failed { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::MissingOutput { stage, .. }
            | StageError::Io { stage, .. } => *stage,
        }
    }
}

/// The cleaned annotation table does not have the expected shape.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("annotation table {path:?} is empty, not even a header line")]
    EmptyTable { path: PathBuf },
    #[error("required column {column:?} missing from annotation table {path:?}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("line {line} of annotation table {path:?} has {found} fields, header has {expected}")]
    RaggedRow {
        path: PathBuf,
        line: u64,
        expected: u64,
        found: u64,
    },
}

impl Termination for StageError {
    fn report(self) -> ExitCode {
        match self {
            StageError::Failed {
                code: Some(code), ..
            } if (1..=255).contains(&code) => ExitCode::from(code as u8),
            _ => ExitCode::FAILURE,
        }
    }
}
