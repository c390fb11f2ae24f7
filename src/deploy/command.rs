// ABOUTME: Spawns external commands with their output streamed into a deployment log.
// ABOUTME: Shared by source acquisition and lifecycle hook execution.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

use super::log::DeploymentLog;

/// Render a command line for log output.
pub fn display_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Run `program args` in `cwd`, with stdout and stderr appended to the log.
///
/// Runs to completion; the exit status is returned for the caller to judge.
pub async fn run_logged<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    cwd: &Path,
    envs: &[(String, String)],
    log: &DeploymentLog,
) -> io::Result<ExitStatus> {
    log.line(format!(
        ">>> {} (in {})",
        display_command(program, args),
        cwd.display()
    ));

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(log.stdio()?)
        .stderr(log.stdio()?)
        .kill_on_drop(true)
        .spawn()?;

    child.wait().await
}

/// Run a command and capture its trimmed stdout. Stderr goes to the log.
pub async fn capture<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    cwd: &Path,
    log: &DeploymentLog,
) -> io::Result<(ExitStatus, String)> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(log.stdio()?)
        .output()
        .await?;

    Ok((
        output.status,
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}
