// ABOUTME: Coordinates self-restart with in-flight deployments.
// ABOUTME: Exit requests wait until the last running deployment has ended.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct State {
    in_flight: usize,
    exit_requested: bool,
}

/// Whether the process may exit yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// No exit has been requested.
    Running,
    /// Exit requested; waiting for deployments to finish.
    Draining { in_flight: usize },
    /// Exit requested and nothing is running.
    Drained,
}

impl From<State> for DrainState {
    fn from(state: State) -> Self {
        match (state.exit_requested, state.in_flight) {
            (false, _) => DrainState::Running,
            (true, 0) => DrainState::Drained,
            (true, in_flight) => DrainState::Draining { in_flight },
        }
    }
}

/// Tracks deployments in flight and a pending exit request.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    state: Arc<watch::Sender<State>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(State::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Count a deployment as in flight until the guard is dropped.
    pub fn begin_deployment(&self) -> InFlight {
        self.state.send_modify(|s| s.in_flight += 1);
        InFlight {
            state: Arc::clone(&self.state),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.borrow().in_flight
    }

    pub fn exit_requested(&self) -> bool {
        self.state.borrow().exit_requested
    }

    /// Ask the process to exit once nothing is in flight.
    pub fn request_exit(&self) -> DrainState {
        self.state.send_modify(|s| s.exit_requested = true);
        self.state()
    }

    pub fn state(&self) -> DrainState {
        DrainState::from(*self.state.borrow())
    }

    /// Resolves once exit has been requested and the in-flight count is zero.
    pub async fn drained(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx
            .wait_for(|s| DrainState::from(*s) == DrainState::Drained)
            .await;
    }
}

/// Guard for one in-flight deployment.
#[derive(Debug)]
pub struct InFlight {
    state: Arc<watch::Sender<State>>,
}

impl InFlight {
    /// End the deployment explicitly. Dropping the guard does the same.
    pub fn end(self) {}
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.state
            .send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
    }
}

/// Polls a file's modification time.
#[derive(Debug)]
pub struct FileWatcher {
    path: PathBuf,
    interval: Duration,
    last: Option<SystemTime>,
}

impl FileWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        let path = path.into();
        let last = modified(&path);
        Self {
            path,
            interval,
            last,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the file's modification time differs from the last seen.
    pub async fn changed(&mut self) {
        loop {
            tokio::time::sleep(self.interval).await;
            let now = modified(&self.path);
            if now != self.last {
                self.last = now;
                return;
            }
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Request exit whenever the running executable is replaced on disk.
pub async fn watch_executable(coordinator: ShutdownCoordinator, exe: PathBuf, interval: Duration) {
    let mut watcher = FileWatcher::new(exe, interval);
    loop {
        watcher.changed().await;
        match coordinator.request_exit() {
            DrainState::Draining { in_flight } => tracing::info!(
                "{} changed; exiting after {in_flight} deployment(s) finish",
                watcher.path().display()
            ),
            _ => tracing::info!("{} changed; exiting", watcher.path().display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_waits_for_in_flight() {
        let coordinator = ShutdownCoordinator::new();
        let first = coordinator.begin_deployment();
        let second = coordinator.begin_deployment();
        assert_eq!(coordinator.state(), DrainState::Running);

        assert_eq!(coordinator.request_exit(), DrainState::Draining { in_flight: 2 });
        first.end();
        assert_eq!(coordinator.state(), DrainState::Draining { in_flight: 1 });
        drop(second);
        assert_eq!(coordinator.state(), DrainState::Drained);
    }

    #[test]
    fn idle_exit_is_immediate() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.request_exit(), DrainState::Drained);
    }

    #[tokio::test]
    async fn drained_resolves_when_last_deployment_ends() {
        let coordinator = ShutdownCoordinator::new();
        let guard = coordinator.begin_deployment();
        coordinator.request_exit();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.drained().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn watcher_notices_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stagecoach");
        std::fs::write(&path, "v1").unwrap();
        let mut watcher = FileWatcher::new(&path, Duration::from_millis(10));

        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
        tokio::time::timeout(Duration::from_secs(5), watcher.changed())
            .await
            .unwrap();
    }
}
