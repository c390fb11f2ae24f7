// ABOUTME: Versioned, swappable configuration snapshots for hot reload.
// ABOUTME: Readers always see one complete Config; reloads replace it atomically.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::Config;
use crate::error::Result;
use crate::shutdown::FileWatcher;

/// A consistent view of the configuration at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub config: Arc<Config>,
}

/// Shared handle to the live configuration.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    current: RwLock<Snapshot>,
}

impl ConfigStore {
    /// Load the configuration at `path` as version 1.
    pub fn open(path: &Path) -> Result<Self> {
        let config = Config::load(path)?;
        Ok(Self::with_config(path, config))
    }

    pub fn with_config(path: &Path, config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.to_path_buf(),
                current: RwLock::new(Snapshot {
                    version: 1,
                    config: Arc::new(config),
                }),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.current.read().clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.inner.current.read().config.clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.current.read().version
    }

    /// Re-read the file and publish it as a new version.
    ///
    /// The file is parsed and validated before the swap, so a broken edit
    /// leaves the previous snapshot in place and returns the error.
    pub fn reload(&self) -> Result<u64> {
        let config = Arc::new(Config::load(&self.inner.path)?);
        let mut current = self.inner.current.write();
        current.version += 1;
        current.config = config;
        tracing::info!(
            "Loaded configuration version {} from {}",
            current.version,
            self.inner.path.display()
        );
        Ok(current.version)
    }
}

/// Reload `store` whenever its file changes. Failed reloads are logged and
/// the previous snapshot stays live.
pub async fn watch_config(store: ConfigStore, interval: Duration) {
    let mut watcher = FileWatcher::new(store.path(), interval);
    loop {
        watcher.changed().await;
        if let Err(e) = store.reload() {
            tracing::warn!(
                "ignoring broken configuration {}: {e}",
                store.path().display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const FIRST: &str = r#"
projects:
  site:
    key: one
    branches:
      main: {}
"#;

    const SECOND: &str = r#"
projects:
  site:
    key: two
    branches:
      main: {}
"#;

    #[test]
    fn reload_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stagecoach.yml");
        fs::write(&path, FIRST).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        let before = store.snapshot();
        assert_eq!(before.version, 1);

        fs::write(&path, SECOND).unwrap();
        assert_eq!(store.reload().unwrap(), 2);

        assert_eq!(store.config().projects["site"].key, "two");
        // A snapshot taken earlier is unaffected.
        assert_eq!(before.config.projects["site"].key, "one");
    }

    #[test]
    fn broken_reload_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stagecoach.yml");
        fs::write(&path, FIRST).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        fs::write(&path, "projects: [unterminated").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.version(), 1);
        assert_eq!(store.config().projects["site"].key, "one");
    }
}
