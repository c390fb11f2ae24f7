// ABOUTME: Error types for deployment operations.
// ABOUTME: Covers lock, source, hook, sync, and swap failures plus the final failure report.

use std::path::PathBuf;
use std::time::Duration;

use super::source::SourceError;
use super::state::{Disposition, Phase};
use crate::diagnostics::Warning;
use crate::hooks::HookPoint;

/// Errors that can occur while running a deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Gave up waiting for another deployment to release the lock.
    #[error("timed out after {}s waiting for deploy lock {}", waited.as_secs(), path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// Lock file could not be created, read, or removed.
    #[error("deploy lock error: {0}")]
    Lock(String),

    /// Source could not be fetched or extracted.
    #[error("source fetch failed: {0}")]
    SourceFetch(#[from] SourceError),

    /// A lifecycle script exited unsuccessfully.
    #[error("{hook} hook failed: {}", describe_status(*status))]
    Hook {
        hook: HookPoint,
        status: Option<i32>,
    },

    /// A lifecycle script could not be started at all.
    #[error("{hook} hook could not be started: {source}")]
    HookSpawn {
        hook: HookPoint,
        #[source]
        source: std::io::Error,
    },

    /// Mirroring the checkout into the release directory failed.
    #[error("failed to sync release directory: {0}")]
    Sync(#[source] std::io::Error),

    /// Reading or repointing the `current` link failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Swap {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The deployment log or project directories could not be created.
    #[error("failed to prepare {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    LockTimeout,
    Lock,
    SourceFetch,
    Hook,
    Sync,
    Swap,
    Filesystem,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::LockTimeout { .. } => DeployErrorKind::LockTimeout,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::SourceFetch(_) => DeployErrorKind::SourceFetch,
            DeployError::Hook { .. } | DeployError::HookSpawn { .. } => DeployErrorKind::Hook,
            DeployError::Sync(_) => DeployErrorKind::Sync,
            DeployError::Swap { .. } => DeployErrorKind::Swap,
            DeployError::Filesystem { .. } => DeployErrorKind::Filesystem,
        }
    }

    /// The hook point that failed, for hook errors.
    pub fn hook(&self) -> Option<HookPoint> {
        match self {
            DeployError::Hook { hook, .. } | DeployError::HookSpawn { hook, .. } => Some(*hook),
            _ => None,
        }
    }

    /// The phase an error of this kind belongs to, when it implies one.
    ///
    /// Swap errors can happen while unlinking or relinking, so those are
    /// resolved from the release record instead.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            DeployError::LockTimeout { .. }
            | DeployError::Lock(_)
            | DeployError::SourceFetch(_)
            | DeployError::Sync(_)
            | DeployError::Filesystem { .. } => Some(Phase::Preparing),
            DeployError::Hook { hook, .. } | DeployError::HookSpawn { hook, .. } => {
                Some(match hook {
                    HookPoint::BeforeConnecting | HookPoint::Dependencies => Phase::Preparing,
                    HookPoint::Stop => Phase::Stopping,
                    HookPoint::Migrate => Phase::Migrating,
                    HookPoint::Start => Phase::Starting,
                })
            }
            DeployError::Swap { .. } => None,
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn swap(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        DeployError::Swap {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Final report for a deployment that did not complete.
///
/// `error` is always the failure that stopped the pipeline; problems hit
/// while rolling back are only ever recorded in `warnings`.
#[derive(Debug, thiserror::Error)]
#[error("deployment failed during {phase} phase: {error} ({disposition})")]
pub struct DeployFailure {
    #[source]
    pub error: DeployError,
    pub phase: Phase,
    pub disposition: Disposition,
    pub warnings: Vec<Warning>,
}
