// ABOUTME: Deploy lock serializing deployments through a lock file under the install root.
// ABOUTME: Atomic create-if-not-exists with holder info; stale locks are reclaimed with a warning.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use super::error::DeployError;
use super::log::DeploymentLog;
use crate::config::LockSettings;
use crate::types::DeploymentId;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Deployment holding the lock.
    pub deployment: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(deployment: &DeploymentId) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            deployment: deployment.to_string(),
        }
    }

    /// Time since `started_at`, or `None` when it lies in the future.
    pub fn age(&self) -> Option<Duration> {
        (Utc::now() - self.started_at).to_std().ok()
    }

    /// Check if this lock is older than `threshold`.
    ///
    /// A start time in the future is never stale here; callers judge such a
    /// lock by its file age instead.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age().is_some_and(|age| age >= threshold)
    }
}

/// Age after which a leftover reclaim guard is presumed abandoned.
const RECLAIM_GUARD_STALE: Duration = Duration::from_secs(30);

/// How long to wait for a lock and when to consider one abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub wait: Duration,
    pub stale: Duration,
    pub poll: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(60 * 60),
            stale: Duration::from_secs(59 * 60),
            poll: Duration::from_millis(100),
        }
    }
}

impl From<&LockSettings> for LockPolicy {
    fn from(settings: &LockSettings) -> Self {
        Self {
            wait: settings.wait,
            stale: settings.stale,
            poll: settings.poll,
        }
    }
}

/// What was found at the lock path.
enum Existing {
    Held(LockInfo),
    /// Abandoned. `content` is the exact bytes that were judged stale.
    Stale {
        info: Option<LockInfo>,
        content: Vec<u8>,
    },
    /// Removed between our create attempt and the inspection.
    Gone,
}

/// Result of an attempt to remove a stale lock.
enum Reclaim {
    Removed,
    /// The lock is no longer the one judged stale.
    Changed,
    /// Another waiter is reclaiming it right now.
    Busy,
}

/// A held deploy lock. Removed on `release()`, or on drop as a fallback.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    released: bool,
}

impl DeployLock {
    /// Acquire the lock at `path`, polling until it is free or `policy.wait`
    /// has elapsed.
    ///
    /// A lock older than `policy.stale` is removed and retried immediately.
    /// Age comes from the recorded `started_at`, or the file's modification
    /// time when the content cannot be parsed or the start lies in the future.
    /// Waiters racing on one stale lock remove it at most once.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::LockTimeout` when the wait expires and
    /// `DeployError::Lock` when the lock file cannot be created or read.
    pub async fn acquire(
        path: &Path,
        policy: &LockPolicy,
        info: LockInfo,
        log: &DeploymentLog,
    ) -> Result<Self, DeployError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DeployError::Lock(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let body = serde_json::to_vec(&info)
            .map_err(|e| DeployError::Lock(format!("failed to serialize lock: {e}")))?;
        let started = Instant::now();
        let deadline = started + policy.wait;
        let mut announced = false;

        loop {
            match try_create(path, &body).await {
                Ok(()) => {
                    if announced {
                        log.line(format!(
                            "Obtained deploy lock after {}s",
                            started.elapsed().as_secs()
                        ));
                    }
                    tracing::debug!("acquired deploy lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(DeployError::Lock(format!(
                        "failed to create {}: {e}",
                        path.display()
                    )));
                }
            }

            match inspect(path, policy.stale).await? {
                Existing::Gone => continue,
                Existing::Stale { info, content } => match reclaim(path, &content).await? {
                    Reclaim::Removed => {
                        let message = match info {
                            Some(p) => format!(
                                "Reclaiming stale deploy lock held by {} (pid {}, deployment {}) since {}",
                                p.holder, p.pid, p.deployment, p.started_at
                            ),
                            None => "Reclaiming stale deploy lock with unreadable holder info"
                                .to_string(),
                        };
                        tracing::warn!("{message}");
                        log.line(message);
                        continue;
                    }
                    Reclaim::Changed => continue,
                    Reclaim::Busy => {}
                },
                Existing::Held(holder) => {
                    if !announced {
                        log.line(format!(
                            "Waiting for deploy lock held by {} (pid {}, deployment {})...",
                            holder.holder, holder.pid, holder.deployment
                        ));
                        announced = true;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DeployError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(policy.poll.min(deadline - now)).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub async fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::Lock(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn try_create(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = async {
        file.write_all(body).await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(())
}

fn guard_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".reclaim");
    PathBuf::from(name)
}

/// Remove the lock at `path` only if it still holds exactly `observed`.
///
/// The check and the removal happen while holding `<path>.reclaim`, so of
/// several waiters that judged the same lock stale only one removes it, and
/// none removes a lock created after the inspection.
async fn reclaim(path: &Path, observed: &[u8]) -> Result<Reclaim, DeployError> {
    let guard = guard_path(path);
    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&guard)
        .await
    {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if file_age(&guard)
                .await
                .is_ok_and(|age| age >= RECLAIM_GUARD_STALE)
            {
                tracing::warn!("removing abandoned reclaim guard {}", guard.display());
                let _ = tokio::fs::remove_file(&guard).await;
            }
            return Ok(Reclaim::Busy);
        }
        Err(e) => {
            return Err(DeployError::Lock(format!(
                "failed to create {}: {e}",
                guard.display()
            )));
        }
    }

    let outcome = remove_if_unchanged(path, observed).await;

    if let Err(e) = tokio::fs::remove_file(&guard).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("failed to remove reclaim guard {}: {e}", guard.display());
        }
    }
    outcome
}

async fn remove_if_unchanged(path: &Path, observed: &[u8]) -> Result<Reclaim, DeployError> {
    match tokio::fs::read(path).await {
        Ok(content) if content == observed => {}
        Ok(_) => return Ok(Reclaim::Changed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Reclaim::Changed),
        Err(e) => {
            return Err(DeployError::Lock(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(Reclaim::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Reclaim::Changed),
        Err(e) => Err(DeployError::Lock(format!(
            "failed to remove stale lock {}: {e}",
            path.display()
        ))),
    }
}

/// Time since the file at `path` was last modified.
async fn file_age(path: &Path) -> io::Result<Duration> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

async fn inspect(path: &Path, stale: Duration) -> Result<Existing, DeployError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Existing::Gone),
        Err(e) => {
            return Err(DeployError::Lock(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let info = serde_json::from_slice::<LockInfo>(&content).ok();
    if let Some(age) = info.as_ref().and_then(LockInfo::age) {
        return Ok(match info {
            Some(info) if age < stale => Existing::Held(info),
            info => Existing::Stale { info, content },
        });
    }

    // Unparseable, possibly still being written, or started in the future:
    // judge by mtime.
    let age = match file_age(path).await {
        Ok(age) => age,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Existing::Gone),
        Err(e) => {
            return Err(DeployError::Lock(format!(
                "failed to stat {}: {e}",
                path.display()
            )));
        }
    };
    if age >= stale {
        Ok(Existing::Stale { info, content })
    } else {
        Ok(Existing::Held(info.unwrap_or_else(|| LockInfo {
            holder: "unknown".to_string(),
            pid: 0,
            started_at: Utc::now()
                - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero()),
            deployment: "unknown".to_string(),
        })))
    }
}
