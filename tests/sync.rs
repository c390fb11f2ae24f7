// ABOUTME: Integration tests for mirroring a checkout into a release directory.
// ABOUTME: Exercises project exclude files and the re-included core directory.

use std::fs;

use stagecoach::deploy::{DeploymentLog, EXCLUDE_FILE, mirror_release};
use stagecoach::types::DeploymentId;

#[tokio::test]
async fn project_exclude_file_extends_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = dir.path().join("checkout");
    let release = dir.path().join("deployments/2024-01-01-00-00-00");

    fs::create_dir_all(checkout.join(".git/objects")).unwrap();
    fs::create_dir_all(checkout.join("node_modules/left-pad")).unwrap();
    fs::create_dir_all(checkout.join("lib/core")).unwrap();
    fs::create_dir_all(checkout.join("deployment")).unwrap();
    fs::write(checkout.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    fs::write(checkout.join("node_modules/left-pad/index.js"), "pad").unwrap();
    fs::write(checkout.join("lib/core/boot.js"), "boot").unwrap();
    fs::write(checkout.join("app.js"), "app").unwrap();
    fs::write(checkout.join("app.js.orig"), "conflict").unwrap();
    fs::write(checkout.join(EXCLUDE_FILE), "node_modules/\n").unwrap();

    let log = DeploymentLog::create(&dir.path().join("logs"), &DeploymentId::now()).unwrap();
    let stats = mirror_release(&checkout, &release, &log).await.unwrap();

    assert!(release.join("app.js").exists());
    assert!(release.join("lib/core/boot.js").exists());
    assert!(release.join(EXCLUDE_FILE).exists());
    assert!(!release.join(".git").exists());
    assert!(!release.join("node_modules").exists());
    assert!(!release.join("app.js.orig").exists());
    assert_eq!(stats.files, 3);
}

#[tokio::test]
async fn mirror_preserves_modes_and_times() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let checkout = dir.path().join("checkout");
    let release = dir.path().join("release");
    fs::create_dir_all(checkout.join("bin")).unwrap();
    let tool = checkout.join("bin/tool");
    fs::write(&tool, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o750)).unwrap();
    filetime::set_file_mtime(&tool, filetime::FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let log = DeploymentLog::create(&dir.path().join("logs"), &DeploymentId::now()).unwrap();
    mirror_release(&checkout, &release, &log).await.unwrap();

    let meta = fs::metadata(release.join("bin/tool")).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, 0o750);
    assert_eq!(
        filetime::FileTime::from_last_modification_time(&meta).unix_seconds(),
        1_600_000_000
    );
}
