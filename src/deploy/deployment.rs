// ABOUTME: Generic release struct parameterized by state marker.
// ABOUTME: Carries the per-attempt deployment record through the swap state machine.

use std::path::{Path, PathBuf};

use super::error::DeployError;
use super::state::{Phase, Prepared};
use crate::layout::ProjectLayout;
use crate::types::DeploymentId;

/// Everything known about one deployment attempt.
///
/// The flags record how far the swap got so rollback knows which steps to undo.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub log_name: String,
    pub release_dir: PathBuf,
    pub current: PathBuf,
    pub phase: Phase,
    /// The previous live release was told to stop and did so.
    pub stopped: bool,
    /// `current` has been removed (the point of no return).
    pub unlinked: bool,
    /// `current` has been recreated pointing at `release_dir`.
    pub relinked: bool,
    /// Target of `current` before this deployment touched it.
    pub former: Option<PathBuf>,
}

impl DeploymentRecord {
    pub fn new(id: DeploymentId, log_name: impl Into<String>, project: &ProjectLayout) -> Self {
        Self {
            id,
            log_name: log_name.into(),
            release_dir: project.release(&id),
            current: project.current(),
            phase: Phase::Preparing,
            stopped: false,
            unlinked: false,
            relinked: false,
            former: None,
        }
    }
}

/// A release in progress, parameterized by its current state.
///
/// Each transition consumes the release and returns the next state, so the
/// swap steps cannot be reordered or skipped.
#[derive(Debug)]
pub struct Release<S> {
    pub(crate) record: DeploymentRecord,
    pub(crate) state: S,
}

impl Release<Prepared> {
    /// Start a release, capturing the current link target before anything
    /// destructive happens.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Swap` if `current` exists but is not a symlink or
    /// cannot be read.
    pub async fn prepare(mut record: DeploymentRecord) -> Result<Self, DeployError> {
        record.former = read_current(&record.current).await?;
        Ok(Release {
            record,
            state: Prepared,
        })
    }
}

impl<S> Release<S> {
    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    pub fn id(&self) -> &DeploymentId {
        &self.record.id
    }

    pub fn release_dir(&self) -> &Path {
        &self.record.release_dir
    }

    pub fn current(&self) -> &Path {
        &self.record.current
    }

    pub fn phase(&self) -> Phase {
        self.record.phase
    }

    /// Target of `current` before this deployment (None on first deploy).
    pub fn former(&self) -> Option<&Path> {
        self.record.former.as_deref()
    }
}

/// Resolve the `current` link one level, or None if it does not exist.
pub(crate) async fn read_current(current: &Path) -> Result<Option<PathBuf>, DeployError> {
    match tokio::fs::symlink_metadata(current).await {
        Ok(meta) if meta.file_type().is_symlink() => tokio::fs::read_link(current)
            .await
            .map(Some)
            .map_err(|e| DeployError::swap("read", current, e)),
        Ok(_) => Err(DeployError::swap(
            "use",
            current,
            std::io::Error::new(std::io::ErrorKind::InvalidData, "not a symbolic link"),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DeployError::swap("inspect", current, e)),
    }
}
