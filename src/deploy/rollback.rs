// ABOUTME: Compensating actions for a release that failed partway through the swap.
// ABOUTME: One handler for every recoverable state, driven by how far the record got.

use std::path::Path;

use super::deployment::{DeploymentRecord, Release, read_current};
use super::error::{DeployError, DeployFailure};
use super::log::DeploymentLog;
use super::state::{Disposition, Recoverable};
use crate::diagnostics::{Diagnostics, Warning};
use crate::hooks::{HookPoint, HookRunner};

/// Which compensating steps actually happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// `current` points at the former release again.
    pub relinked_former: bool,
    /// The former release's start hook was re-run successfully.
    pub restarted: bool,
    /// The failed release directory is gone.
    pub removed_release: bool,
}

impl<S: Recoverable> Release<S> {
    /// Undo whatever this release did to the live state.
    ///
    /// 1. Remove `current` if it points at the new release.
    /// 2. If `current` was unlinked, point it back at the former release.
    /// 3. If the former release was stopped, run its start hook again.
    /// 4. Remove the new release directory.
    ///
    /// Every step is attempted; failures become rollback warnings.
    pub async fn rollback(
        self,
        hooks: &HookRunner,
        log: &DeploymentLog,
        diag: &mut Diagnostics,
    ) -> (DeploymentRecord, RollbackReport) {
        let record = self.record;
        let mut report = RollbackReport::default();

        log.line("Rolling back...");

        if record.relinked || points_at(&record.current, &record.release_dir).await {
            match tokio::fs::remove_file(&record.current).await {
                Ok(()) => log.line(format!("Removed {}", record.current.display())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => step_failed(
                    log,
                    diag,
                    format!("cannot remove {}: {e}", record.current.display()),
                ),
            }
        }

        if record.unlinked {
            if let Some(former) = &record.former {
                log.line(format!(
                    "Relinking {} -> {}",
                    record.current.display(),
                    former.display()
                ));
                match tokio::fs::symlink(former, &record.current).await {
                    Ok(()) => report.relinked_former = true,
                    Err(e) => step_failed(
                        log,
                        diag,
                        format!("cannot relink {}: {e}", record.current.display()),
                    ),
                }
            }
        }

        if record.stopped {
            log.line("Restarting previous deployment...");
            match hooks.run(HookPoint::Start, &record.current, log).await {
                Ok(_) => report.restarted = true,
                Err(e) => step_failed(
                    log,
                    diag,
                    format!("cannot restart previous deployment: {e}"),
                ),
            }
        }

        match tokio::fs::remove_dir_all(&record.release_dir).await {
            Ok(()) => {
                log.line(format!("Removed {}", record.release_dir.display()));
                report.removed_release = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.removed_release = true,
            Err(e) => step_failed(
                log,
                diag,
                format!("cannot remove {}: {e}", record.release_dir.display()),
            ),
        }

        (record, report)
    }

    /// Roll back and produce the failure report for `error`.
    ///
    /// The reported error is always `error`; anything that goes wrong while
    /// rolling back is only recorded in `diag`, which the caller attaches to
    /// the report.
    pub async fn fail(
        self,
        error: DeployError,
        hooks: &HookRunner,
        log: &DeploymentLog,
        diag: &mut Diagnostics,
    ) -> DeployFailure {
        let phase = self.record.phase;
        log.line(format!("Failed during {phase} phase: {error}"));

        let (record, _report) = self.rollback(hooks, log, diag).await;
        let disposition = disposition(&record);
        log.line(format!("Deployment failed, {disposition}"));

        DeployFailure {
            error,
            phase,
            disposition,
            warnings: Vec::new(),
        }
    }
}

/// What the live release went through, judged from how far `record` got.
fn disposition(record: &DeploymentRecord) -> Disposition {
    if record.former.is_none() {
        Disposition::FirstDeployment
    } else if record.stopped || record.unlinked {
        Disposition::RolledBack
    } else {
        Disposition::Unchanged
    }
}

fn step_failed(log: &DeploymentLog, diag: &mut Diagnostics, message: String) {
    log.line(format!("Rollback step failed: {message}"));
    diag.warn(Warning::rollback(message));
}

async fn points_at(current: &Path, release: &Path) -> bool {
    matches!(read_current(current).await, Ok(Some(target)) if target == release)
}
