// ABOUTME: Append-only per-deployment log file with one-shot finalization.
// ABOUTME: The file name tells pollers whether a deployment is running or finished.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::types::DeploymentId;

/// How a finished deployment ended, encoded in the final log name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Succeeded,
    Failed,
}

impl LogStatus {
    fn suffix(&self) -> &'static str {
        match self {
            LogStatus::Succeeded => "final",
            LogStatus::Failed => "failed",
        }
    }
}

/// Log sink for one deployment attempt.
///
/// Spawned commands share the underlying file descriptor, so their output
/// lands in the log in the order it is produced.
#[derive(Debug)]
pub struct DeploymentLog {
    id: DeploymentId,
    dir: PathBuf,
    path: PathBuf,
    file: File,
}

impl DeploymentLog {
    /// Create `<dir>/<id>.log`, appending if it already exists.
    pub fn create(dir: &Path, id: &DeploymentId) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::in_progress_name(id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            id: *id,
            dir: dir.to_path_buf(),
            path,
            file,
        })
    }

    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the log while the deployment is running.
    pub fn in_progress_name(id: &DeploymentId) -> String {
        format!("{id}.log")
    }

    /// Name of the log once the deployment has ended with `status`.
    pub fn final_name(id: &DeploymentId, status: LogStatus) -> String {
        format!("{id}.{}.log", status.suffix())
    }

    /// Append a line. Write failures are reported through tracing only;
    /// losing a log line must not fail the deployment.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(deployment = %self.id, "{message}");
        if let Err(e) = writeln!(&self.file, "{message}") {
            tracing::warn!(deployment = %self.id, "failed to write deployment log: {e}");
        }
    }

    /// A handle suitable for a child's stdout or stderr.
    pub fn stdio(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.file.try_clone()?))
    }

    /// Close the log and move it to its final name.
    ///
    /// Consumes the log, so it can only be finalized once.
    pub fn finalize(self, status: LogStatus) -> io::Result<PathBuf> {
        let DeploymentLog { id, dir, path, file } = self;
        file.sync_all()?;
        drop(file);
        let target = dir.join(Self::final_name(&id, status));
        fs::rename(&path, &target)?;
        Ok(target)
    }

    /// Find the log for a requested file name in whichever form currently exists.
    ///
    /// Accepts any of the names a log goes by so a link published at the start
    /// of a deployment keeps working after it finishes. Names that do not start
    /// with a deployment id are rejected, which also keeps lookups inside `dir`.
    pub fn locate(dir: &Path, requested: &str) -> Option<PathBuf> {
        let stem = requested.split('.').next()?;
        let id = DeploymentId::parse(stem).ok()?;
        [
            Self::in_progress_name(&id),
            Self::final_name(&id, LogStatus::Succeeded),
            Self::final_name(&id, LogStatus::Failed),
        ]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> DeploymentId {
        DeploymentId::parse("2024-05-06-07-08-09").unwrap()
    }

    #[test]
    fn lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeploymentLog::create(dir.path(), &id()).unwrap();
        log.line("first");
        log.line("second");

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn finalize_renames_by_status() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeploymentLog::create(dir.path(), &id()).unwrap();
        log.line("done");
        let running = log.path().to_path_buf();

        let finished = log.finalize(LogStatus::Succeeded).unwrap();
        assert!(!running.exists());
        assert_eq!(
            finished.file_name().unwrap(),
            "2024-05-06-07-08-09.final.log"
        );
        assert_eq!(fs::read_to_string(finished).unwrap(), "done\n");
    }

    #[test]
    fn failed_deployments_get_their_own_final_name() {
        assert_eq!(
            DeploymentLog::final_name(&id(), LogStatus::Failed),
            "2024-05-06-07-08-09.failed.log"
        );
    }

    #[test]
    fn locate_follows_renames() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeploymentLog::create(dir.path(), &id()).unwrap();

        let found = DeploymentLog::locate(dir.path(), "2024-05-06-07-08-09.log").unwrap();
        assert_eq!(found, log.path());

        let finished = log.finalize(LogStatus::Failed).unwrap();
        let found = DeploymentLog::locate(dir.path(), "2024-05-06-07-08-09.log").unwrap();
        assert_eq!(found, finished);
    }

    #[test]
    fn locate_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DeploymentLog::locate(dir.path(), "../../etc/passwd").is_none());
        assert!(DeploymentLog::locate(dir.path(), "").is_none());
    }
}
