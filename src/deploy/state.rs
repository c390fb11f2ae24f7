// ABOUTME: Release state marker types for the type state pattern, plus runtime phases.
// ABOUTME: Zero-sized types enforce the swap order; Phase records how far a deployment got.

use std::fmt;

/// Pipeline position, recorded on the deployment as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Lock, source, before-connecting, sync, dependencies.
    Preparing,
    /// Running the stop hook against the live release.
    Stopping,
    /// Running the migrate hook in the new release.
    Migrating,
    /// `current` has been removed: the point of no return.
    Unlinked,
    /// `current` points at the new release.
    Relinked,
    /// Running the start hook against `current`.
    Starting,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preparing => "preparing",
            Phase::Stopping => "stopping",
            Phase::Migrating => "migrating",
            Phase::Unlinked => "unlinked",
            Phase::Relinked => "relinked",
            Phase::Starting => "starting",
            Phase::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failed deployment left the live release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing live was touched: the lock was never obtained, `current`
    /// could not be read, or the failure came before the live release was
    /// stopped or unlinked.
    Unchanged,
    /// The previous release is live again.
    RolledBack,
    /// There was no previous release; the failed one was cleaned up.
    FirstDeployment,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Disposition::Unchanged => "no changes were made",
            Disposition::RolledBack => "rolled back to previous release",
            Disposition::FirstDeployment => "first deployment, nothing to roll back to",
        })
    }
}

mod sealed {
    pub trait Sealed {}
}

/// States from which a failed release can still be rolled back.
pub trait Recoverable: sealed::Sealed {}

/// Release directory allocated; nothing live has been touched.
/// Available actions: `stop()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Prepared;

/// Stop hook attempted against the live release.
/// Available actions: `migrate()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Stopped;

/// Migrations ran in the new release.
/// Available actions: `unlink()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Migrated;

/// `current` removed.
/// Available actions: `relink()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlinked;

/// `current` points at the new release.
/// Available actions: `start()`, `rollback()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Relinked;

/// New release started.
/// Available actions: `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Started;

impl sealed::Sealed for Prepared {}
impl sealed::Sealed for Stopped {}
impl sealed::Sealed for Migrated {}
impl sealed::Sealed for Unlinked {}
impl sealed::Sealed for Relinked {}

impl Recoverable for Prepared {}
impl Recoverable for Stopped {}
impl Recoverable for Migrated {}
impl Recoverable for Unlinked {}
impl Recoverable for Relinked {}
