//! Allocation of one output directory per pipeline run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::err::WorkspaceError;

/// Number of random characters appended to the timestamp of a run ID.
const DISAMBIGUATOR_LEN: usize = 6;

/// Number of directory names to try before giving up.
const MAX_ATTEMPTS: usize = 16;

/// Hands out fresh run directories below a results root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

/// A freshly created, empty run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    /// Run identifier, also the name of the directory.
    pub run_id: String,
    /// Path to the directory.
    pub path: PathBuf,
}

impl Workspace {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new run directory for a run started at `now`.
    ///
    /// The name is `run_<YYYYmmdd_HHMMSS>_<random>`.  The directory itself is
    /// created with `create_dir` so an existing one is never handed out
    /// twice, also not to runs started within the same second.
    pub fn allocate<Tz>(&self, now: &DateTime<Tz>) -> Result<RunDir, WorkspaceError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        std::fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::CreateDir {
            path: self.root.clone(),
            source,
        })?;

        let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
        for attempt in 0..MAX_ATTEMPTS {
            let suffix = std::iter::repeat_with(fastrand::alphanumeric)
                .take(DISAMBIGUATOR_LEN)
                .collect::<String>();
            let run_id = format!("run_{}_{}", timestamp, suffix);
            let path = self.root.join(&run_id);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!("created run directory {:?}", &path);
                    return Ok(RunDir { run_id, path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(
                        "run directory {:?} exists already (attempt {})",
                        &path,
                        attempt + 1
                    );
                }
                Err(source) => return Err(WorkspaceError::CreateDir { path, source }),
            }
        }

        Err(WorkspaceError::Exhausted {
            root: self.root.clone(),
            attempts: MAX_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_ne;

    use super::Workspace;

    #[test]
    fn allocate_creates_directory() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let workspace = Workspace::new(tmp_dir.join("results"));
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        let run_dir = workspace.allocate(&now)?;

        assert!(run_dir.path.is_dir());
        assert!(run_dir.run_id.starts_with("run_20240301_123005_"));
        assert_eq!(run_dir.run_id.len(), "run_20240301_123005_".len() + 6);
        assert_eq!(run_dir.path, workspace.root().join(&run_dir.run_id));

        Ok(())
    }

    #[test]
    fn same_second_gives_distinct_directories() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let workspace = Workspace::new(tmp_dir.to_path_buf());
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        let first = workspace.allocate(&now)?;
        std::fs::write(first.path.join("aligned.bam"), b"first")?;
        let second = workspace.allocate(&now)?;

        assert_ne!(first.path, second.path);
        assert!(!second.path.join("aligned.bam").exists());
        assert_eq!(std::fs::read(first.path.join("aligned.bam"))?, b"first");

        Ok(())
    }

    #[test]
    fn colliding_disambiguator_is_redrawn() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let workspace = Workspace::new(tmp_dir.to_path_buf());
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        fastrand::seed(42);
        let first = workspace.allocate(&now)?;
        fastrand::seed(42);
        let second = workspace.allocate(&now)?;

        assert_ne!(first.run_id, second.run_id);
        assert!(first.path.is_dir());
        assert!(second.path.is_dir());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_root_is_reported() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let blocker = tmp_dir.join("not-a-dir");
        std::fs::write(&blocker, b"")?;
        let workspace = Workspace::new(blocker.join("results"));
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        let err = workspace.allocate(&now).unwrap_err();

        assert!(matches!(err, crate::err::WorkspaceError::CreateDir { .. }));

        Ok(())
    }
}
