// ABOUTME: Hooks system for deployment lifecycle events.
// ABOUTME: Discovers and executes deployment/<hook> scripts at fixed pipeline phases.

use std::path::{Path, PathBuf};

use crate::deploy::{DeployError, DeploymentLog, run_logged};
use crate::types::DeploymentId;

/// Directory inside a tree that holds lifecycle scripts.
pub const HOOKS_DIR: &str = "deployment";

/// Hook execution points in the deployment lifecycle, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// In `checkout/`, before dependencies are installed. Failure aborts deployment.
    BeforeConnecting,
    /// In the new release directory after sync; installs dependencies and runs
    /// safe migrations. Failure aborts deployment.
    Dependencies,
    /// Against `current`, before it is replaced. Failure logs a warning.
    Stop,
    /// In the new release directory once the old release is stopped. Failure
    /// triggers rollback.
    Migrate,
    /// Against `current` after the swap. Failure triggers rollback.
    Start,
}

impl HookPoint {
    /// Get the hook filename for this point.
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::BeforeConnecting => "before-connecting",
            HookPoint::Dependencies => "dependencies",
            HookPoint::Stop => "stop",
            HookPoint::Migrate => "migrate",
            HookPoint::Start => "start",
        }
    }

    /// Whether failure at this hook point should abort deployment.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HookPoint::Stop)
    }

    /// Path of the script relative to the tree it runs in.
    pub fn script(&self) -> PathBuf {
        Path::new(HOOKS_DIR).join(self.filename())
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.filename())
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub project: String,
    pub branch: String,
    pub deployment: DeploymentId,
    pub release: PathBuf,
    pub previous_release: Option<PathBuf>,
}

impl HookContext {
    /// Convert context to environment variables.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("STAGECOACH_PROJECT".to_string(), self.project.clone()),
            ("STAGECOACH_BRANCH".to_string(), self.branch.clone()),
            ("STAGECOACH_DEPLOYMENT".to_string(), self.deployment.to_string()),
            (
                "STAGECOACH_RELEASE".to_string(),
                self.release.display().to_string(),
            ),
        ];
        if let Some(ref prev) = self.previous_release {
            env.push((
                "STAGECOACH_PREVIOUS_RELEASE".to_string(),
                prev.display().to_string(),
            ));
        }
        env
    }
}

/// What happened when a hook point was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// The tree has no script for this point.
    Skipped,
    Succeeded,
}

/// Runs lifecycle scripts through a shell.
#[derive(Debug, Clone)]
pub struct HookRunner {
    shell: String,
    env: Vec<(String, String)>,
}

impl HookRunner {
    pub fn new(shell: impl Into<String>, context: &HookContext) -> Self {
        Self {
            shell: shell.into(),
            env: context.to_env(),
        }
    }

    /// Check if a hook exists for the given point in `dir`.
    pub fn hook_exists(dir: &Path, point: HookPoint) -> bool {
        dir.join(point.script()).is_file()
    }

    /// Run the hook for `point` with `dir` as its working directory.
    ///
    /// `dir` is passed through untouched, including as `PWD`, so a hook run
    /// against the `current` link sees the link path and not the release it
    /// happens to resolve to. An absent script is not a failure.
    pub async fn run(
        &self,
        point: HookPoint,
        dir: &Path,
        log: &DeploymentLog,
    ) -> Result<HookOutcome, DeployError> {
        if !Self::hook_exists(dir, point) {
            log.line(format!("No {} script, skipping", point.script().display()));
            return Ok(HookOutcome::Skipped);
        }

        log.line(format!("Running {point} hook..."));

        let mut env = self.env.clone();
        env.push(("PWD".to_string(), dir.display().to_string()));
        let script = point.script();

        let status = run_logged(&self.shell, &[script.as_os_str()], dir, &env, log)
            .await
            .map_err(|source| DeployError::HookSpawn { hook: point, source })?;

        if status.success() {
            log.line(format!("{point} hook completed"));
            Ok(HookOutcome::Succeeded)
        } else {
            Err(DeployError::Hook {
                hook: point,
                status: status.code(),
            })
        }
    }
}
