// ABOUTME: Deployment engine using the type state pattern for the release swap.
// ABOUTME: Exports the lock, log, source, sync, prune, and engine building blocks.

mod command;
mod deployment;
mod engine;
mod error;
mod lock;
mod log;
mod prune;
mod rollback;
mod source;
mod state;
mod sync;
mod transitions;

pub use command::{capture, display_command, run_logged};
pub use deployment::{DeploymentRecord, Release};
pub use engine::{Accepted, DeployEngine, DeployOutcome, DeployRequest, EngineOptions};
pub use error::{DeployError, DeployErrorKind, DeployFailure};
pub use lock::{DeployLock, LockInfo, LockPolicy};
pub use log::{DeploymentLog, LogStatus};
pub use prune::{PruneFailure, PruneResult, prune_candidates, prune_releases};
pub use rollback::RollbackReport;
pub use source::{
    ArchiveExtract, ContentId, GitFetch, Source, SourceError, SourceErrorKind, SourceProvider,
    discard_lockfile,
};
pub use state::{
    Disposition, Migrated, Phase, Prepared, Recoverable, Relinked, Started, Stopped, Unlinked,
};
pub use sync::{EXCLUDE_FILE, ExcludeRules, MirrorStats, mirror, mirror_release};
pub use transitions::TransitionResult;
