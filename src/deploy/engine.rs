// ABOUTME: End-to-end deployment pipeline from trigger to finalized log.
// ABOUTME: Serializes work through the deploy lock and routes late failures through rollback.

use std::path::PathBuf;
use std::sync::Arc;

use super::deployment::{DeploymentRecord, Release};
use super::error::{DeployError, DeployFailure};
use super::lock::{DeployLock, LockInfo, LockPolicy};
use super::log::{DeploymentLog, LogStatus};
use super::prune::prune_releases;
use super::source::{ContentId, Source, discard_lockfile};
use super::state::{Disposition, Phase, Prepared};
use super::sync::mirror_release;
use crate::config::{Config, LockScope, Settings};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::hooks::{HookContext, HookPoint, HookRunner};
use crate::layout::{Layout, ProjectLayout};
use crate::notify::{self, Event, Notice, Notifier};
use crate::shutdown::ShutdownCoordinator;
use crate::types::{DeploymentId, IdAllocator};

/// One validated trigger.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Effective settings, fixed for the whole deployment.
    pub settings: Settings,
    pub source: Source,
}

/// Acknowledgement returned as soon as a trigger is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub id: DeploymentId,
    pub log_name: String,
    pub log_url: Option<String>,
}

/// Result of a successful deployment.
#[derive(Debug)]
pub struct DeployOutcome {
    pub id: DeploymentId,
    pub release: PathBuf,
    pub content: ContentId,
    pub pruned: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
}

/// Host-wide engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub layout: Layout,
    pub lock: LockPolicy,
    pub lock_scope: LockScope,
    pub shell: String,
    pub public_url: Option<String>,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: Layout::new(&config.root),
            lock: LockPolicy::from(&config.lock),
            lock_scope: config.lock.scope,
            shell: config.hooks.shell.clone(),
            public_url: config.public_url.clone(),
        }
    }
}

/// Runs deployments. Cheap to clone; clones share the id allocator and
/// shutdown coordinator.
#[derive(Clone)]
pub struct DeployEngine {
    inner: Arc<Inner>,
}

struct Inner {
    options: EngineOptions,
    notifier: Arc<dyn Notifier>,
    shutdown: ShutdownCoordinator,
    ids: IdAllocator,
}

impl std::fmt::Debug for DeployEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployEngine")
            .field("options", &self.inner.options)
            .finish()
    }
}

impl DeployEngine {
    pub fn new(
        options: EngineOptions,
        notifier: Arc<dyn Notifier>,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                notifier,
                shutdown,
                ids: IdAllocator::new(),
            }),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.options.layout
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.inner.shutdown
    }

    /// Accept a trigger and run it in the background.
    ///
    /// The log exists by the time this returns, so the published link works
    /// immediately. The outcome is only reported through the log and the
    /// notifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::ShuttingDown` once an exit has been requested, or an
    /// I/O error if the log cannot be created.
    pub fn trigger(&self, request: DeployRequest) -> Result<Accepted> {
        if self.inner.shutdown.exit_requested() {
            return Err(Error::ShuttingDown);
        }
        let in_flight = self.inner.shutdown.begin_deployment();
        let log = self.open_log()?;
        let accepted = self.accepted(&log);

        let engine = self.clone();
        tokio::spawn(async move {
            let _in_flight = in_flight;
            let _outcome = engine.run(request, log).await;
        });
        Ok(accepted)
    }

    /// Run a deployment to completion in the foreground.
    ///
    /// # Errors
    ///
    /// Returns `Error::Deploy` with the failure report if the deployment did
    /// not complete.
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome> {
        let _in_flight = self.inner.shutdown.begin_deployment();
        let log = self.open_log()?;
        self.run(request, log)
            .await
            .map_err(|failure| Error::Deploy(Box::new(failure)))
    }

    fn open_log(&self) -> Result<DeploymentLog> {
        let id = self.inner.ids.next();
        Ok(DeploymentLog::create(&self.layout().logs_dir(), &id)?)
    }

    fn accepted(&self, log: &DeploymentLog) -> Accepted {
        let log_name = DeploymentLog::in_progress_name(log.id());
        let log_url = self
            .inner
            .options
            .public_url
            .as_deref()
            .map(|base| notify::log_url(base, &log_name));
        Accepted {
            id: *log.id(),
            log_name,
            log_url,
        }
    }

    async fn run(
        &self,
        request: DeployRequest,
        log: DeploymentLog,
    ) -> std::result::Result<DeployOutcome, DeployFailure> {
        let accepted = self.accepted(&log);
        let settings = &request.settings;
        let id = accepted.id;

        tracing::info!(
            deployment = %id,
            "deploying {} ({})",
            settings.project,
            settings.branch
        );
        self.announce(settings, &id, accepted.log_url.as_deref(), Event::Started, &log)
            .await;

        let mut result = self.execute(&request, &log).await;

        let status = match &result {
            Ok(outcome) => {
                log.line(format!(
                    "Deployment {id} complete: {} is live at {}",
                    outcome.content,
                    outcome.release.display()
                ));
                LogStatus::Succeeded
            }
            Err(failure) => {
                log.line(format!("Deployment {id} FAILED: {failure}"));
                for warning in &failure.warnings {
                    log.line(format!("warning: {}", warning.message));
                }
                LogStatus::Failed
            }
        };

        let event = match &result {
            Ok(outcome) => Event::Succeeded {
                content: &outcome.content,
            },
            Err(failure) => Event::Failed { failure },
        };
        self.announce(settings, &id, accepted.log_url.as_deref(), event, &log)
            .await;

        if let Err(e) = log.finalize(status) {
            tracing::warn!(deployment = %id, "failed to finalize deployment log: {e}");
            let warning = Warning::log(format!("cannot finalize deployment log: {e}"));
            match &mut result {
                Ok(outcome) => outcome.warnings.push(warning),
                Err(failure) => failure.warnings.push(warning),
            }
        }

        match &result {
            Ok(_) => tracing::info!(deployment = %id, "deployment succeeded"),
            Err(failure) => tracing::error!(deployment = %id, "{failure}"),
        }
        result
    }

    async fn announce(
        &self,
        settings: &Settings,
        id: &DeploymentId,
        log_url: Option<&str>,
        event: Event<'_>,
        log: &DeploymentLog,
    ) {
        let Some(endpoint) = settings.notify.as_deref() else {
            return;
        };
        let notice = Notice {
            project: &settings.project,
            branch: &settings.branch,
            deployment: id,
            log_url,
            event,
        };
        if let Err(e) = self.inner.notifier.notify(endpoint, &notice.text()).await {
            log.line(format!("Notification failed: {e}"));
            tracing::warn!(deployment = %id, "notification failed: {e}");
        }
    }

    /// Everything that happens while holding the deploy lock.
    async fn execute(
        &self,
        request: &DeployRequest,
        log: &DeploymentLog,
    ) -> std::result::Result<DeployOutcome, DeployFailure> {
        let options = &self.inner.options;
        let settings = &request.settings;
        let id = *log.id();
        let mut diag = Diagnostics::default();

        let lock_path = options.layout.lock_path(options.lock_scope, &settings.short_name);
        log.line(format!("Acquiring deploy lock {}...", lock_path.display()));
        let lock = DeployLock::acquire(&lock_path, &options.lock, LockInfo::new(&id), log)
            .await
            .map_err(untouched)?;

        let result = self.pipeline(request, log, &mut diag).await;

        if let Err(e) = lock.release().await {
            diag.warn(Warning::lock_release(e.to_string()));
        }

        match result {
            Ok((record, content, pruned)) => Ok(DeployOutcome {
                id,
                release: record.release_dir,
                content,
                pruned,
                warnings: diag.into_warnings(),
            }),
            Err(mut failure) => {
                failure.warnings.extend(diag.into_warnings());
                Err(failure)
            }
        }
    }

    async fn pipeline(
        &self,
        request: &DeployRequest,
        log: &DeploymentLog,
        diag: &mut Diagnostics,
    ) -> std::result::Result<(DeploymentRecord, ContentId, Vec<PathBuf>), DeployFailure> {
        let options = &self.inner.options;
        let settings = &request.settings;
        let id = *log.id();
        let project = options.layout.project(&settings.short_name);

        let deployments = project.deployments();
        tokio::fs::create_dir_all(&deployments)
            .await
            .map_err(|e| untouched(DeployError::filesystem(&deployments, e)))?;

        let record = DeploymentRecord::new(id, DeploymentLog::in_progress_name(&id), &project);
        let release = Release::<Prepared>::prepare(record)
            .await
            .map_err(untouched)?;

        let hooks = HookRunner::new(
            options.shell.clone(),
            &HookContext {
                project: settings.project.clone(),
                branch: settings.branch.clone(),
                deployment: id,
                release: release.release_dir().to_path_buf(),
                previous_release: release.former().map(|p| p.to_path_buf()),
            },
        );

        let content = match prepare_tree(request, &project, &release, &hooks, log).await {
            Ok(content) => content,
            Err(e) => return Err(release.fail(e, &hooks, log, diag).await),
        };

        let release = release.stop(&hooks, log, diag).await;

        let release = match release.migrate(&hooks, log).await {
            Ok(r) => r,
            Err((r, e)) => return Err(r.fail(e, &hooks, log, diag).await),
        };
        let release = match release.unlink(log).await {
            Ok(r) => r,
            Err((r, e)) => return Err(r.fail(e, &hooks, log, diag).await),
        };
        let release = match release.relink(log).await {
            Ok(r) => r,
            Err((r, e)) => return Err(r.fail(e, &hooks, log, diag).await),
        };
        let release = match release.start(&hooks, log).await {
            Ok(r) => r,
            Err((r, e)) => return Err(r.fail(e, &hooks, log, diag).await),
        };
        let record = release.finish();

        let pruned = prune_releases(&deployments, &record.current, settings.keep, log).await;
        for failure in &pruned.failed {
            diag.warn(Warning::prune(format!(
                "cannot remove {}: {}",
                failure.path.display(),
                failure.error
            )));
        }

        Ok((record, content, pruned.removed))
    }
}

/// Source, before-connecting, sync and dependencies: everything before the
/// live release is touched.
async fn prepare_tree(
    request: &DeployRequest,
    project: &ProjectLayout,
    release: &Release<Prepared>,
    hooks: &HookRunner,
    log: &DeploymentLog,
) -> std::result::Result<ContentId, DeployError> {
    let settings = &request.settings;
    let checkout = project.checkout();

    let provider = request.source.provider(settings)?;
    if settings.discard_lockfile && request.source == Source::Repository {
        discard_lockfile(&checkout, &settings.lockfile, log).await?;
    }
    log.line(format!("Fetching {}...", provider.describe()));
    let content = provider.sync(&checkout, log).await?;
    log.line(format!("Checked out {content}"));

    hooks.run(HookPoint::BeforeConnecting, &checkout, log).await?;
    mirror_release(&checkout, release.release_dir(), log).await?;
    hooks
        .run(HookPoint::Dependencies, release.release_dir(), log)
        .await?;

    Ok(content)
}

/// Failure before any rollback is possible or needed.
fn untouched(error: DeployError) -> DeployFailure {
    DeployFailure {
        error,
        phase: Phase::Preparing,
        disposition: Disposition::Unchanged,
        warnings: Vec::new(),
    }
}
