// ABOUTME: Project and branch deployment specs plus effective-setting resolution.
// ABOUTME: Branch values override project values, which override global defaults.

use serde::Deserialize;
use std::collections::HashMap;

use super::deserialize::deserialize_short_name_option;
use crate::error::{Error, Result};
use crate::types::ShortName;

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSpec {
    /// Repository URL for version-control fetches. Archive-only projects omit it.
    #[serde(default)]
    pub repo: Option<String>,

    /// Shared secret a trigger must present.
    pub key: String,

    #[serde(default)]
    pub branches: HashMap<String, BranchSpec>,

    /// Release directories retained after a successful deployment.
    #[serde(default = "default_keep")]
    pub keep: usize,

    #[serde(default)]
    pub discard_lockfile: bool,

    #[serde(default = "default_lockfile")]
    pub lockfile: String,

    #[serde(default)]
    pub notify: Option<String>,

    #[serde(default, deserialize_with = "deserialize_short_name_option")]
    pub short_name: Option<ShortName>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchSpec {
    #[serde(default, deserialize_with = "deserialize_short_name_option")]
    pub short_name: Option<ShortName>,

    #[serde(default)]
    pub discard_lockfile: Option<bool>,

    #[serde(default)]
    pub notify: Option<String>,
}

fn default_keep() -> usize {
    5
}

fn default_lockfile() -> String {
    "package-lock.json".to_string()
}

/// The fully resolved settings for one deployment.
///
/// Built once when a trigger is accepted; a config reload afterwards does not
/// affect a deployment already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project: String,
    pub branch: String,
    pub short_name: ShortName,
    pub repo: Option<String>,
    pub keep: usize,
    pub discard_lockfile: bool,
    pub lockfile: String,
    pub notify: Option<String>,
}

impl ProjectSpec {
    /// Resolve the effective settings for `branch` of this project.
    ///
    /// Precedence, highest first: branch, project, global.
    pub fn resolve(
        &self,
        project: &str,
        branch: &str,
        global_notify: Option<&str>,
    ) -> Result<Settings> {
        let spec = self
            .branches
            .get(branch)
            .ok_or_else(|| Error::UnknownBranch {
                project: project.to_string(),
                branch: branch.to_string(),
            })?;

        let short_name = match spec.short_name.as_ref().or(self.short_name.as_ref()) {
            Some(name) => name.clone(),
            None => ShortName::new(project).map_err(|e| {
                Error::InvalidConfig(format!(
                    "project name '{project}' is not usable as a directory name ({e}); set short_name"
                ))
            })?,
        };

        let notify = spec
            .notify
            .clone()
            .or_else(|| self.notify.clone())
            .or_else(|| global_notify.map(str::to_string));

        Ok(Settings {
            project: project.to_string(),
            branch: branch.to_string(),
            short_name,
            repo: self.repo.clone(),
            keep: self.keep,
            discard_lockfile: spec.discard_lockfile.unwrap_or(self.discard_lockfile),
            lockfile: self.lockfile.clone(),
            notify,
        })
    }

    /// Check a presented trigger key against the project's secret.
    pub fn key_matches(&self, presented: &str) -> bool {
        // Length leaks, contents do not.
        let expected = self.key.as_bytes();
        let presented = presented.as_bytes();
        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}
