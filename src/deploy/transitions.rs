// ABOUTME: State transition methods for the release swap.
// ABOUTME: Each method consumes self and returns the next state on success.

use super::deployment::{DeploymentRecord, Release};
use super::error::DeployError;
use super::log::DeploymentLog;
use super::state::{Migrated, Phase, Prepared, Relinked, Started, Stopped, Unlinked};
use crate::diagnostics::{Diagnostics, Warning};
use crate::hooks::{HookOutcome, HookPoint, HookRunner};

/// Result type for transitions that may need rollback on failure.
///
/// On failure the release comes back in its previous state, so the caller can
/// still roll it back.
pub type TransitionResult<T, S> = Result<Release<T>, (Release<S>, DeployError)>;

impl<S> Release<S> {
    /// Internal helper to transition to a new state.
    fn transition<T>(self, state: T) -> Release<T> {
        Release {
            record: self.record,
            state,
        }
    }
}

// =============================================================================
// Prepared -> Stopped
// =============================================================================

impl Release<Prepared> {
    /// Ask the live release to stop.
    ///
    /// Best effort: the old process may already be down, so a failure is
    /// recorded as a warning and the deployment continues. `stopped` is only
    /// set when a stop script actually ran and succeeded.
    pub async fn stop(
        mut self,
        hooks: &HookRunner,
        log: &DeploymentLog,
        diag: &mut Diagnostics,
    ) -> Release<Stopped> {
        self.record.phase = Phase::Stopping;

        if self.record.former.is_some() {
            log.line("Stopping old deployment...");
            match hooks.run(HookPoint::Stop, &self.record.current, log).await {
                Ok(HookOutcome::Succeeded) => self.record.stopped = true,
                Ok(HookOutcome::Skipped) => {}
                Err(e) => {
                    log.line(format!("Cannot stop current deployment, that may be OK: {e}"));
                    diag.warn(Warning::stop(format!(
                        "cannot stop current deployment: {e}"
                    )));
                }
            }
        }

        self.transition(Stopped)
    }
}

// =============================================================================
// Stopped -> Migrated
// =============================================================================

impl Release<Stopped> {
    /// Run migrations in the new release. The old release has been told to
    /// stop, so these may need exclusive access.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    pub async fn migrate(
        mut self,
        hooks: &HookRunner,
        log: &DeploymentLog,
    ) -> TransitionResult<Migrated, Stopped> {
        self.record.phase = Phase::Migrating;
        log.line("Running unsafe migrations...");
        match hooks.run(HookPoint::Migrate, &self.record.release_dir, log).await {
            Ok(_) => Ok(self.transition(Migrated)),
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// Migrated -> Unlinked
// =============================================================================

impl Release<Migrated> {
    /// Remove the `current` link. Past this point rollback must relink.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    pub async fn unlink(mut self, log: &DeploymentLog) -> TransitionResult<Unlinked, Migrated> {
        self.record.phase = Phase::Unlinked;
        if self.record.former.is_some() {
            log.line(format!("Removing {}", self.record.current.display()));
            if let Err(e) = tokio::fs::remove_file(&self.record.current).await {
                let err = DeployError::swap("remove", &self.record.current, e);
                return Err((self, err));
            }
            self.record.unlinked = true;
        }
        Ok(self.transition(Unlinked))
    }
}

// =============================================================================
// Unlinked -> Relinked
// =============================================================================

impl Release<Unlinked> {
    /// Point `current` at the new release directory.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    pub async fn relink(mut self, log: &DeploymentLog) -> TransitionResult<Relinked, Unlinked> {
        self.record.phase = Phase::Relinked;
        log.line(format!(
            "Linking {} -> {}",
            self.record.current.display(),
            self.record.release_dir.display()
        ));
        if let Err(e) = tokio::fs::symlink(&self.record.release_dir, &self.record.current).await {
            let err = DeployError::swap("link", &self.record.current, e);
            return Err((self, err));
        }
        self.record.relinked = true;
        Ok(self.transition(Relinked))
    }
}

// =============================================================================
// Relinked -> Started
// =============================================================================

impl Release<Relinked> {
    /// Start the new release through the `current` link.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    pub async fn start(
        mut self,
        hooks: &HookRunner,
        log: &DeploymentLog,
    ) -> TransitionResult<Started, Relinked> {
        self.record.phase = Phase::Starting;
        log.line("Running start...");
        match hooks.run(HookPoint::Start, &self.record.current, log).await {
            Ok(_) => {
                log.line("Ran start");
                Ok(self.transition(Started))
            }
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// Started - Terminal State
// =============================================================================

impl Release<Started> {
    /// Consume the release and return its final record.
    pub fn finish(mut self) -> DeploymentRecord {
        self.record.phase = Phase::Complete;
        self.record
    }
}
