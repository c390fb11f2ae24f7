// ABOUTME: Configuration types and parsing for stagecoach.yml.
// ABOUTME: Handles YAML parsing, validation, path discovery, and per-branch resolution.

mod deserialize;
mod hooks;
mod lock;
mod project;
mod store;

pub use hooks::HookSettings;
pub use lock::{LockScope, LockSettings};
pub use project::{BranchSpec, ProjectSpec, Settings};
pub use store::{ConfigStore, Snapshot, watch_config};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "STAGECOACH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/stagecoach.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_listen")]
    pub listen: String,

    /// Base URL used when publishing links to deployment logs.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Fallback notification webhook for projects that set none.
    #[serde(default)]
    pub notify: Option<String>,

    #[serde(default)]
    pub lock: LockSettings,

    #[serde(default)]
    pub hooks: HookSettings,

    #[serde(default)]
    pub projects: HashMap<String, ProjectSpec>,
}

fn default_root() -> PathBuf {
    PathBuf::from("/opt/stagecoach")
}

fn default_listen() -> String {
    "0.0.0.0:4000".to_string()
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_yaml(&content)
    }

    /// Pick the config file: explicit path, then `$STAGECOACH_CONFIG`, then the default.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    pub fn project(&self, name: &str) -> Result<&ProjectSpec> {
        self.projects
            .get(name)
            .ok_or_else(|| Error::UnknownProject(name.to_string()))
    }

    /// Effective settings for one deployment of `project`/`branch`.
    pub fn resolve(&self, project: &str, branch: &str) -> Result<Settings> {
        self.project(project)?
            .resolve(project, branch, self.notify.as_deref())
    }

    fn validate(&self) -> Result<()> {
        if self.lock.stale >= self.lock.wait {
            tracing::warn!(
                "lock.stale ({:?}) is not below lock.wait ({:?}); abandoned locks will time callers out before being reclaimed",
                self.lock.stale,
                self.lock.wait
            );
        }

        for (name, project) in &self.projects {
            if project.key.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "project '{name}' has an empty key"
                )));
            }
            if project.keep == 0 {
                return Err(Error::InvalidConfig(format!(
                    "project '{name}': keep must be at least 1"
                )));
            }
            for branch in project.branches.keys() {
                self.resolve(name, branch)?;
            }
        }
        Ok(())
    }
}
