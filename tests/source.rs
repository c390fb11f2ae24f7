// ABOUTME: Integration tests for git source acquisition.
// ABOUTME: Covers fresh clones, incremental pulls, and the clone fallback.

mod support;

use std::fs;

use stagecoach::deploy::{ContentId, DeploymentLog, GitFetch, SourceErrorKind, SourceProvider};
use stagecoach::types::DeploymentId;
use support::{git, init_repo};

fn log(dir: &std::path::Path) -> DeploymentLog {
    DeploymentLog::create(&dir.join("logs"), &DeploymentId::now()).unwrap()
}

#[tokio::test]
async fn clone_then_pull_tracks_branch_head() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("origin");
    init_repo(&origin);
    let checkout = dir.path().join("apps/site/checkout");
    let log = log(dir.path());

    let fetch = GitFetch::new(origin.display().to_string(), "main");
    let first = fetch.sync(&checkout, &log).await.unwrap();
    assert_eq!(first, ContentId::Revision(git(&origin, &["rev-parse", "HEAD"])));
    assert_eq!(fs::read_to_string(checkout.join("README")).unwrap(), "first\n");

    fs::write(origin.join("README"), "second\n").unwrap();
    git(&origin, &["commit", "-q", "-am", "second"]);

    let second = fetch.sync(&checkout, &log).await.unwrap();
    assert_eq!(second, ContentId::Revision(git(&origin, &["rev-parse", "HEAD"])));
    assert_ne!(first, second);
    assert_eq!(fs::read_to_string(checkout.join("README")).unwrap(), "second\n");
    assert!(fs::read_to_string(log.path()).unwrap().contains("Updating existing checkout"));
}

#[tokio::test]
async fn diverged_checkout_falls_back_to_clone() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("origin");
    init_repo(&origin);
    let checkout = dir.path().join("checkout");
    let log = log(dir.path());

    let fetch = GitFetch::new(origin.display().to_string(), "main");
    fetch.sync(&checkout, &log).await.unwrap();

    // Local history the origin does not have makes --ff-only impossible.
    fs::write(checkout.join("README"), "local\n").unwrap();
    git(&checkout, &["commit", "-q", "-am", "local"]);
    fs::write(origin.join("README"), "upstream\n").unwrap();
    git(&origin, &["commit", "-q", "-am", "upstream"]);

    let content = fetch.sync(&checkout, &log).await.unwrap();
    assert_eq!(content, ContentId::Revision(git(&origin, &["rev-parse", "HEAD"])));
    assert_eq!(fs::read_to_string(checkout.join("README")).unwrap(), "upstream\n");
    assert!(fs::read_to_string(log.path()).unwrap().contains("cloning fresh"));
}

#[tokio::test]
async fn broken_checkout_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("origin");
    init_repo(&origin);
    let checkout = dir.path().join("checkout");
    fs::create_dir_all(checkout.join(".git")).unwrap();
    fs::write(checkout.join("junk"), "x").unwrap();

    let fetch = GitFetch::new(origin.display().to_string(), "main");
    fetch.sync(&checkout, &log(dir.path())).await.unwrap();

    assert!(!checkout.join("junk").exists());
    assert!(checkout.join("README").exists());
}

#[tokio::test]
async fn unknown_branch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("origin");
    init_repo(&origin);

    let fetch = GitFetch::new(origin.display().to_string(), "nope");
    let err = fetch
        .sync(&dir.path().join("checkout"), &log(dir.path()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SourceErrorKind::Command);
}

#[tokio::test]
async fn lockfile_is_discarded_before_update() {
    let fixture = support::Fixture::new();
    let origin = fixture.work.join("origin");
    init_repo(&origin);
    fs::write(origin.join(".gitignore"), "package-lock.json\n").unwrap();
    git(&origin, &["add", "-A"]);
    git(&origin, &["commit", "-q", "-m", "ignore lockfile"]);

    let mut settings = fixture.settings(5);
    settings.repo = Some(origin.display().to_string());
    settings.discard_lockfile = true;
    let engine = fixture.engine();
    let request = || stagecoach::deploy::DeployRequest {
        settings: settings.clone(),
        source: stagecoach::deploy::Source::Repository,
    };

    engine.deploy(request()).await.unwrap();
    let checkout = fixture.project().checkout();
    fs::write(checkout.join("package-lock.json"), "{}").unwrap();

    let outcome = engine.deploy(request()).await.unwrap();
    assert!(!checkout.join("package-lock.json").exists());
    assert!(!outcome.release.join("package-lock.json").exists());
    assert!(outcome.release.join("README").exists());
}
