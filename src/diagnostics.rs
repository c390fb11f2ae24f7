// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be reported.

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The previous release could not be stopped.
    pub fn stop(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Stop, message)
    }

    /// An old release directory could not be pruned.
    pub fn prune(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Prune, message)
    }

    /// A compensating step during rollback failed.
    pub fn rollback(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Rollback, message)
    }

    /// Create a lock release warning.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    /// The deployment log could not be closed or renamed.
    pub fn log(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Log, message)
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    Stop,
    Prune,
    Rollback,
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    Log,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::prune("failed to remove deployments/2024-01-01-00-00-00"));
        diag.warn(Warning::rollback("failed to relink current"));

        assert!(diag.has_warnings());
        assert_eq!(diag.warnings().len(), 2);
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(Warning::stop("x").kind, WarningKind::Stop);
        assert_eq!(Warning::prune("x").kind, WarningKind::Prune);
        assert_eq!(Warning::rollback("x").kind, WarningKind::Rollback);
        assert_eq!(Warning::lock_release("x").kind, WarningKind::LockRelease);
        assert_eq!(Warning::log("x").kind, WarningKind::Log);
    }
}
