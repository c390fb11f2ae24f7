// ABOUTME: Source acquisition strategies that populate a project's checkout.
// ABOUTME: Git fetch with clone fallback, or fresh extraction of an uploaded tarball.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu};

use super::command::{capture, display_command, run_logged};
use super::log::DeploymentLog;
use crate::config::Settings;

/// Errors from fetching or extracting source.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    #[snafu(display("failed to run {command}: {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("{command} {}", describe_status(*status)))]
    CommandFailed { command: String, status: Option<i32> },

    #[snafu(display("failed to prepare {}: {source}", path.display()))]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to extract {}: {source}", path.display()))]
    Extract {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("project has no repository configured"))]
    NoRepository,

    #[snafu(display("cannot resolve revision: {reason}"))]
    Revision { reason: String },
}

fn describe_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Command,
    Filesystem,
    Archive,
    Config,
    Revision,
}

impl SourceError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            SourceError::Spawn { .. } | SourceError::CommandFailed { .. } => {
                SourceErrorKind::Command
            }
            SourceError::Filesystem { .. } => SourceErrorKind::Filesystem,
            SourceError::Extract { .. } => SourceErrorKind::Archive,
            SourceError::NoRepository => SourceErrorKind::Config,
            SourceError::Revision { .. } => SourceErrorKind::Revision,
        }
    }
}

/// Identifies exactly what was deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentId {
    /// Commit hash of the checked-out tree.
    Revision(String),
    /// SHA-256 of the uploaded archive, hex encoded.
    ArchiveDigest(String),
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentId::Revision(rev) => write!(f, "revision {rev}"),
            ContentId::ArchiveDigest(digest) => write!(f, "archive sha256 {digest}"),
        }
    }
}

/// Populates `checkout/` with the tree to be released.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Short human-readable summary for the deployment log.
    fn describe(&self) -> String;

    /// Bring `checkout` up to date and report what it now contains.
    async fn sync(&self, checkout: &Path, log: &DeploymentLog) -> Result<ContentId, SourceError>;
}

/// Where a deployment's tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Fetch the configured repository at the deployed branch.
    Repository,
    /// Extract an uploaded gzip tarball. With `discard`, the file is removed
    /// once it has been extracted.
    Archive { path: PathBuf, discard: bool },
}

impl Source {
    /// Build the provider for this source and the given settings.
    pub fn provider(&self, settings: &Settings) -> Result<Box<dyn SourceProvider>, SourceError> {
        match self {
            Source::Repository => {
                let repo = settings.repo.clone().ok_or(SourceError::NoRepository)?;
                Ok(Box::new(GitFetch::new(repo, settings.branch.clone())))
            }
            Source::Archive { path, discard } => Ok(Box::new(ArchiveExtract {
                archive: path.clone(),
                discard: *discard,
            })),
        }
    }
}

/// Incremental `git pull`, falling back to a fresh single-branch clone.
#[derive(Debug, Clone)]
pub struct GitFetch {
    repo: String,
    branch: String,
}

impl GitFetch {
    pub fn new(repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    async fn git(&self, args: &[&str], cwd: &Path, log: &DeploymentLog) -> Result<(), SourceError> {
        let command = display_command("git", args);
        let status = run_logged("git", args, cwd, &[], log)
            .await
            .context(SpawnSnafu {
                command: command.clone(),
            })?;
        if status.success() {
            Ok(())
        } else {
            CommandFailedSnafu {
                command,
                status: status.code(),
            }
            .fail()
        }
    }

    /// Update an existing checkout in place.
    async fn pull(&self, checkout: &Path, log: &DeploymentLog) -> Result<(), SourceError> {
        let args = ["rev-parse", "--abbrev-ref", "HEAD"];
        let (status, on_branch) = capture("git", &args, checkout, log)
            .await
            .context(SpawnSnafu {
                command: display_command("git", &args),
            })?;
        if !status.success() || on_branch != self.branch {
            return RevisionSnafu {
                reason: format!("checkout is on '{on_branch}', expected '{}'", self.branch),
            }
            .fail();
        }
        self.git(&["pull", "--ff-only", "origin", self.branch.as_str()], checkout, log)
            .await
    }

    /// Remove whatever is in `checkout` and clone the branch fresh.
    async fn clone_fresh(&self, checkout: &Path, log: &DeploymentLog) -> Result<(), SourceError> {
        remove_tree(checkout).await?;
        let parent = checkout.parent().unwrap_or(Path::new("/"));
        tokio::fs::create_dir_all(parent)
            .await
            .context(FilesystemSnafu { path: parent })?;

        let target = checkout.to_string_lossy().into_owned();
        self.git(
            &[
                "clone",
                "--single-branch",
                "--branch",
                self.branch.as_str(),
                self.repo.as_str(),
                target.as_str(),
            ],
            parent,
            log,
        )
        .await
    }
}

#[async_trait]
impl SourceProvider for GitFetch {
    fn describe(&self) -> String {
        format!("{} ({})", self.repo, self.branch)
    }

    async fn sync(&self, checkout: &Path, log: &DeploymentLog) -> Result<ContentId, SourceError> {
        if checkout.join(".git").is_dir() {
            log.line("Updating existing checkout...");
            if let Err(e) = self.pull(checkout, log).await {
                log.line(format!("Incremental update failed ({e}), cloning fresh"));
                self.clone_fresh(checkout, log).await?;
            }
        } else {
            log.line("No checkout yet, cloning...");
            self.clone_fresh(checkout, log).await?;
        }

        let args = ["rev-parse", "HEAD"];
        let (status, revision) = capture("git", &args, checkout, log)
            .await
            .context(SpawnSnafu {
                command: display_command("git", &args),
            })?;
        if !status.success() || revision.is_empty() {
            return RevisionSnafu {
                reason: "git rev-parse HEAD failed".to_string(),
            }
            .fail();
        }
        Ok(ContentId::Revision(revision))
    }
}

/// Fresh extraction of a gzip-compressed tarball into `checkout`.
#[derive(Debug, Clone)]
pub struct ArchiveExtract {
    archive: PathBuf,
    discard: bool,
}

impl ArchiveExtract {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            discard: false,
        }
    }

    /// Remove the archive after it has been extracted.
    pub fn discard_after(mut self) -> Self {
        self.discard = true;
        self
    }
}

#[async_trait]
impl SourceProvider for ArchiveExtract {
    fn describe(&self) -> String {
        format!("archive {}", self.archive.display())
    }

    async fn sync(&self, checkout: &Path, log: &DeploymentLog) -> Result<ContentId, SourceError> {
        remove_tree(checkout).await?;
        tokio::fs::create_dir_all(checkout)
            .await
            .context(FilesystemSnafu { path: checkout })?;

        log.line(format!(
            "Extracting {} into {}",
            self.archive.display(),
            checkout.display()
        ));

        let archive = self.archive.clone();
        let dest = checkout.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || extract(&archive, &dest))
            .await
            .map_err(std::io::Error::other)
            .and_then(|r| r)
            .context(ExtractSnafu {
                path: self.archive.clone(),
            })?;

        if self.discard {
            if let Err(e) = tokio::fs::remove_file(&self.archive).await {
                tracing::debug!(
                    "failed to remove uploaded archive {}: {e}",
                    self.archive.display()
                );
            }
        }

        Ok(ContentId::ArchiveDigest(digest))
    }
}

/// Hash the archive, then unpack it into `dest`. Returns the hex digest.
fn extract(archive: &Path, dest: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(archive)?;
    std::io::copy(&mut file, &mut hasher)?;
    let digest = hex::encode(hasher.finalize());

    let file = std::fs::File::open(archive)?;
    let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
    tarball.set_preserve_permissions(true);
    tarball.set_preserve_mtime(true);
    tarball.unpack(dest)?;
    Ok(digest)
}

async fn remove_tree(path: &Path) -> Result<(), SourceError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(FilesystemSnafu { path }),
    }
}

/// Delete a committed dependency-lock file so dependencies resolve fresh.
///
/// A missing file is not an error.
pub async fn discard_lockfile(
    checkout: &Path,
    lockfile: &str,
    log: &DeploymentLog,
) -> Result<(), SourceError> {
    let path = checkout.join(lockfile);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            log.line(format!("Discarded {lockfile}"));
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(FilesystemSnafu { path }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeploymentId, ShortName};

    fn settings(repo: Option<&str>) -> Settings {
        Settings {
            project: "site".to_string(),
            branch: "main".to_string(),
            short_name: ShortName::new("site").unwrap(),
            repo: repo.map(str::to_string),
            keep: 5,
            discard_lockfile: false,
            lockfile: "package-lock.json".to_string(),
            notify: None,
        }
    }

    fn write_tarball(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let body = b"hello\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "public/index.html", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn repository_source_requires_repo() {
        let err = Source::Repository.provider(&settings(None)).err().unwrap();
        assert_eq!(err.kind(), SourceErrorKind::Config);

        let provider = Source::Repository
            .provider(&settings(Some("https://example.com/site.git")))
            .unwrap();
        assert_eq!(provider.describe(), "https://example.com/site.git (main)");
    }

    #[test]
    fn command_failure_message() {
        let err = SourceError::CommandFailed {
            command: "git pull".to_string(),
            status: Some(1),
        };
        assert_eq!(err.to_string(), "git pull exited with status 1");
    }

    #[tokio::test]
    async fn archive_replaces_existing_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("upload.tar.gz");
        write_tarball(&archive);

        let checkout = dir.path().join("checkout");
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(checkout.join("stale.txt"), "old").unwrap();

        let log = DeploymentLog::create(&dir.path().join("logs"), &DeploymentId::now()).unwrap();
        let provider = ArchiveExtract::new(&archive).discard_after();
        let content = provider.sync(&checkout, &log).await.unwrap();

        assert!(matches!(content, ContentId::ArchiveDigest(ref d) if d.len() == 64));
        assert!(!checkout.join("stale.txt").exists());
        assert_eq!(
            std::fs::read_to_string(checkout.join("public/index.html")).unwrap(),
            "hello\n"
        );
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn discard_lockfile_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeploymentLog::create(&dir.path().join("logs"), &DeploymentId::now()).unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();

        discard_lockfile(dir.path(), "package-lock.json", &log).await.unwrap();
        assert!(!dir.path().join("package-lock.json").exists());
        discard_lockfile(dir.path(), "package-lock.json", &log).await.unwrap();
    }
}
