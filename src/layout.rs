// ABOUTME: On-disk layout of the agent's root directory.
// ABOUTME: Single source of truth for checkout, current, release, lock, and log paths.

use std::path::{Path, PathBuf};

use crate::config::LockScope;
use crate::types::{DeploymentId, ShortName};

/// Paths under the install root.
///
/// ```text
/// <root>/apps/<short>/checkout/
/// <root>/apps/<short>/current -> deployments/<id>
/// <root>/apps/<short>/deployments/<id>/
/// <root>/locks/deploy.lock
/// <root>/logs/deployment/<id>.log
/// ```
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.root.join("apps")
    }

    pub fn project(&self, short_name: &ShortName) -> ProjectLayout {
        ProjectLayout {
            dir: self.apps_dir().join(short_name),
        }
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn lock_path(&self, scope: LockScope, short_name: &ShortName) -> PathBuf {
        match scope {
            LockScope::Global => self.locks_dir().join("deploy.lock"),
            LockScope::Project => self.locks_dir().join(format!("{short_name}.lock")),
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs").join("deployment")
    }

    /// Staging area for uploaded archives.
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }
}

/// Paths for a single project.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    dir: PathBuf,
}

impl ProjectLayout {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkout(&self) -> PathBuf {
        self.dir.join("checkout")
    }

    /// The live indirection. Hooks that target the running release are given
    /// this path verbatim, never its resolved target.
    pub fn current(&self) -> PathBuf {
        self.dir.join("current")
    }

    pub fn deployments(&self) -> PathBuf {
        self.dir.join("deployments")
    }

    pub fn release(&self, id: &DeploymentId) -> PathBuf {
        self.deployments().join(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout_contract() {
        let layout = Layout::new("/opt/stagecoach");
        let short = ShortName::new("site").unwrap();
        let project = layout.project(&short);
        let id = DeploymentId::parse("2024-01-02-03-04-05").unwrap();

        assert_eq!(project.checkout(), Path::new("/opt/stagecoach/apps/site/checkout"));
        assert_eq!(project.current(), Path::new("/opt/stagecoach/apps/site/current"));
        assert_eq!(
            project.release(&id),
            Path::new("/opt/stagecoach/apps/site/deployments/2024-01-02-03-04-05")
        );
        assert_eq!(
            layout.lock_path(LockScope::Global, &short),
            Path::new("/opt/stagecoach/locks/deploy.lock")
        );
        assert_eq!(layout.logs_dir(), Path::new("/opt/stagecoach/logs/deployment"));
    }

    #[test]
    fn project_scope_gets_its_own_lock() {
        let layout = Layout::new("/srv");
        let short = ShortName::new("api").unwrap();
        assert_eq!(
            layout.lock_path(LockScope::Project, &short),
            Path::new("/srv/locks/api.lock")
        );
    }
}
