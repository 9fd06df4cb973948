//! Typed description and execution of a single pipeline stage.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use crate::err::StageError;

/// The stages of the pipeline, in execution order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, serde::Serialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Align,
    Index,
    CallVariants,
    Normalize,
    Annotate,
    Clean,
    Report,
}

/// One external program call with its arguments as discrete tokens.
///
/// No shell is involved, file names are passed as single arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    /// File that receives the standard output; only honoured for the last
    /// invocation of a chain.
    pub stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg<A: Into<OsString>>(mut self, arg: A) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdout_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.stdout = Some(path.into());
        self
    }
}

/// A stage: invocations chained stdout to stdin, and the files the stage
/// must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: StageName,
    pub chain: Vec<Invocation>,
    pub outputs: Vec<PathBuf>,
}

/// The checked outputs of a successfully completed stage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StageResult {
    pub name: StageName,
    pub outputs: Vec<PathBuf>,
}

impl StageResult {
    /// The primary output that is handed to the next stage.
    pub fn output(&self) -> Result<&Path, StageError> {
        self.outputs
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| StageError::MissingOutput {
                stage: self.name,
                path: PathBuf::new(),
            })
    }
}

/// Check that each of `outputs` exists and is non-empty.
pub fn check_outputs(stage: StageName, outputs: &[PathBuf]) -> Result<StageResult, StageError> {
    for path in outputs {
        let non_empty = std::fs::metadata(path)
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);
        if !non_empty {
            return Err(StageError::MissingOutput {
                stage,
                path: path.clone(),
            });
        }
    }
    Ok(StageResult {
        name: stage,
        outputs: outputs.to_vec(),
    })
}

/// Something that can execute a stage.
pub trait RunStage {
    fn run_stage(&self, stage: &Stage) -> Result<StageResult, StageError>;
}

/// Runs stages as child processes, waiting synchronously for each.
pub struct ProcessRunner {
    runtime: tokio::runtime::Runtime,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Result<Self, anyhow::Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| anyhow::anyhow!("could not build tokio runtime: {}", e))?;
        Ok(Self { runtime, timeout })
    }

    /// Spawn all invocations of `stage`, connecting them with pipes.
    fn spawn_chain(stage: &Stage) -> Result<Vec<(String, tokio::process::Child)>, StageError> {
        let mut children = Vec::with_capacity(stage.chain.len());
        let mut upstream: Option<Stdio> = None;
        for (i, invocation) in stage.chain.iter().enumerate() {
            let is_last = i + 1 == stage.chain.len();
            tracing::debug!(
                "  {} {:?}{}",
                &invocation.program,
                &invocation.args,
                if is_last { "" } else { " |" }
            );

            let mut cmd = tokio::process::Command::new(&invocation.program);
            cmd.args(&invocation.args)
                .kill_on_drop(true)
                .stdin(upstream.take().unwrap_or_else(Stdio::null));
            if !is_last {
                cmd.stdout(Stdio::piped());
            } else if let Some(path) = &invocation.stdout {
                let file = std::fs::File::create(path).map_err(|source| StageError::Io {
                    stage: stage.name,
                    source,
                })?;
                cmd.stdout(Stdio::from(file));
            }

            let mut child = cmd.spawn().map_err(|source| StageError::Launch {
                stage: stage.name,
                program: invocation.program.clone(),
                source,
            })?;
            if !is_last {
                let stdout = child.stdout.take().ok_or_else(|| StageError::Io {
                    stage: stage.name,
                    source: std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "child has no stdout pipe",
                    ),
                })?;
                upstream = Some(stdout.try_into().map_err(|source| StageError::Io {
                    stage: stage.name,
                    source,
                })?);
            }
            children.push((invocation.program.clone(), child));
        }
        Ok(children)
    }

    /// Wait for all children; with pipefail semantics, the rightmost failing
    /// program decides the outcome.
    async fn wait_chain(
        stage: StageName,
        children: &mut [(String, tokio::process::Child)],
    ) -> Result<(), StageError> {
        let mut statuses: Vec<(String, ExitStatus)> = Vec::with_capacity(children.len());
        for (program, child) in children.iter_mut() {
            let status = child
                .wait()
                .await
                .map_err(|source| StageError::Io { stage, source })?;
            statuses.push((program.clone(), status));
        }
        match statuses.into_iter().rev().find(|(_, status)| !status.success()) {
            Some((program, status)) => Err(StageError::Failed {
                stage,
                program,
                code: status.code(),
                status: status.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl RunStage for ProcessRunner {
    fn run_stage(&self, stage: &Stage) -> Result<StageResult, StageError> {
        let before = Instant::now();
        tracing::info!("running stage `{}`...", stage.name);

        let waited: Result<(), StageError> = self.runtime.block_on(async {
            let mut children = Self::spawn_chain(stage)?;
            match self.timeout {
                Some(timeout) => {
                    let waited =
                        tokio::time::timeout(timeout, Self::wait_chain(stage.name, &mut children))
                            .await;
                    match waited {
                        Ok(result) => result,
                        Err(_) => {
                            for (program, child) in children.iter_mut() {
                                if let Err(e) = child.kill().await {
                                    tracing::warn!("could not kill `{}`: {}", program, e);
                                }
                            }
                            Err(StageError::Timeout {
                                stage: stage.name,
                                timeout,
                            })
                        }
                    }
                }
                None => Self::wait_chain(stage.name, &mut children).await,
            }
        });
        waited?;

        let result = check_outputs(stage.name, &stage.outputs)?;
        tracing::info!(
            "... done with stage `{}` in {:?}",
            stage.name,
            before.elapsed()
        );
        Ok(result)
    }
}
