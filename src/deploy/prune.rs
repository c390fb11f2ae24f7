// ABOUTME: Retention pruning of old release directories after a successful deployment.
// ABOUTME: Timestamp names sort chronologically, so the oldest entries are removed first.

use std::path::{Path, PathBuf};

use super::deployment::read_current;
use super::log::DeploymentLog;

/// A release directory that could not be removed.
#[derive(Debug)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub error: std::io::Error,
}

/// Outcome of a prune pass.
#[derive(Debug, Default)]
pub struct PruneResult {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PruneFailure>,
}

impl PruneResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Entries under `deployments` that are beyond the newest `keep`, oldest first.
///
/// `live` is never a candidate, even when it sorts as the oldest; the
/// next-oldest entry goes in its place.
///
/// # Arguments
///
/// * `deployments` - The project's `deployments/` directory
/// * `keep` - How many entries survive, `live` included
/// * `live` - The release `current` points at, if any
pub async fn prune_candidates(
    deployments: &Path,
    keep: usize,
    live: Option<&Path>,
) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(deployments).await?;
    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();

    let excess = entries.len().saturating_sub(keep);
    Ok(entries
        .into_iter()
        .filter(|entry| Some(entry.as_path()) != live)
        .take(excess)
        .collect())
}

/// Delete the oldest release directories so at most `keep` remain.
///
/// The release `current` resolves to is always kept. Failures are collected,
/// not returned: pruning never fails a deployment.
pub async fn prune_releases(
    deployments: &Path,
    current: &Path,
    keep: usize,
    log: &DeploymentLog,
) -> PruneResult {
    let mut result = PruneResult::default();

    let live = match read_current(current).await {
        Ok(live) => live,
        Err(e) => {
            log.line(format!("Not pruning: {e}"));
            result.failed.push(PruneFailure {
                path: current.to_path_buf(),
                error: std::io::Error::other(e.to_string()),
            });
            return result;
        }
    };

    let candidates = match prune_candidates(deployments, keep, live.as_deref()).await {
        Ok(candidates) => candidates,
        Err(error) => {
            result.failed.push(PruneFailure {
                path: deployments.to_path_buf(),
                error,
            });
            return result;
        }
    };

    for path in candidates {
        log.line(format!("Removing old deployment {}", path.display()));
        let removed = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => result.removed.push(path),
            Err(error) => result.failed.push(PruneFailure { path, error }),
        }
    }

    result
}
