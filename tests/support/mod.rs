// ABOUTME: Test support utilities.
// ABOUTME: Builds install roots, hook-scripted source trees, tarballs, and recording notifiers.

// Each test binary only uses some of these helpers, so allow dead_code.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use stagecoach::config::{LockScope, Settings};
use stagecoach::deploy::{DeployEngine, EngineOptions, LockPolicy};
use stagecoach::layout::{Layout, ProjectLayout};
use stagecoach::notify::{Notifier, NotifyError};
use stagecoach::shutdown::ShutdownCoordinator;
use stagecoach::types::ShortName;
use tempfile::TempDir;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("stagecoach=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const HOOKS: &[&str] = &["before-connecting", "dependencies", "stop", "migrate", "start"];

/// An install root plus a scratch area for source trees, with every hook
/// appending `<hook> <basename of physical cwd> <$PWD>` to a shared journal.
pub struct Fixture {
    _dir: TempDir,
    pub root: PathBuf,
    pub work: PathBuf,
    pub journal: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let work = dir.path().join("work");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&work).unwrap();
        let journal = dir.path().join("journal");
        Self {
            _dir: dir,
            root,
            work,
            journal,
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }

    pub fn project(&self) -> ProjectLayout {
        self.layout().project(&ShortName::new("site").unwrap())
    }

    pub fn settings(&self, keep: usize) -> Settings {
        Settings {
            project: "site".to_string(),
            branch: "main".to_string(),
            short_name: ShortName::new("site").unwrap(),
            repo: None,
            keep,
            discard_lockfile: false,
            lockfile: "package-lock.json".to_string(),
            notify: None,
        }
    }

    pub fn policy(&self) -> LockPolicy {
        LockPolicy {
            wait: Duration::from_secs(30),
            stale: Duration::from_secs(59 * 60),
            poll: Duration::from_millis(10),
        }
    }

    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            layout: self.layout(),
            lock: self.policy(),
            lock_scope: LockScope::Global,
            shell: "sh".to_string(),
            public_url: Some("https://deploy.example.com".to_string()),
        }
    }

    pub fn engine(&self) -> DeployEngine {
        self.engine_with(Arc::new(RecordingNotifier::default()))
    }

    pub fn engine_with(&self, notifier: Arc<dyn Notifier>) -> DeployEngine {
        DeployEngine::new(self.options(), notifier, ShutdownCoordinator::new())
    }

    /// Write a source tree named `label` whose hooks listed in `failing` exit 1.
    pub fn tree(&self, label: &str, failing: &[&str]) -> PathBuf {
        let tree = self.work.join(label);
        let hooks = tree.join("deployment");
        fs::create_dir_all(&hooks).unwrap();
        fs::write(tree.join("VERSION"), label).unwrap();
        for hook in HOOKS {
            let code = if failing.contains(hook) { 1 } else { 0 };
            fs::write(
                hooks.join(hook),
                format!(
                    "echo \"{hook} $(basename \"$(pwd -P)\") $PWD\" >> '{}'\nexit {code}\n",
                    self.journal.display()
                ),
            )
            .unwrap();
        }
        tree
    }

    /// Tarball of `tree(label, failing)`.
    pub fn archive(&self, label: &str, failing: &[&str]) -> PathBuf {
        let tree = self.tree(label, failing);
        let path = self.work.join(format!("{label}.tar.gz"));
        tarball(&tree, &path);
        path
    }

    /// Journal entries as `(hook, physical dir name, $PWD)`.
    pub fn journal(&self) -> Vec<(String, String, String)> {
        let Ok(content) = fs::read_to_string(&self.journal) else {
            return Vec::new();
        };
        content
            .lines()
            .map(|line| {
                let mut parts = line.splitn(3, ' ');
                (
                    parts.next().unwrap_or_default().to_string(),
                    parts.next().unwrap_or_default().to_string(),
                    parts.next().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    /// Journal entries for one hook, as physical dir names.
    pub fn runs_of(&self, hook: &str) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|(h, _, _)| h == hook)
            .map(|(_, dir, _)| dir)
            .collect()
    }

    /// Release directory names, oldest first.
    pub fn releases(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.project().deployments()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Where `current` points, if anywhere.
    pub fn current_target(&self) -> Option<PathBuf> {
        fs::read_link(self.project().current()).ok()
    }
}

pub fn tarball(tree: &Path, path: &Path) {
    let file = fs::File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", tree).unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

/// Run git in `dir` with a fixed identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository at `dir` with one commit on `main`.
pub fn init_repo(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(dir.join("README"), "first\n").unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", "first"]);
}

/// Records every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, endpoint: &str, text: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .push((endpoint.to_string(), text.to_string()));
        Ok(())
    }
}

/// Fails every delivery.
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _endpoint: &str, _text: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Status(reqwest::StatusCode::BAD_GATEWAY))
    }
}
