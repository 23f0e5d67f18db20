//! Utilities for running external commands with proper error handling and timeouts

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

/// Run a command with optional extra environment and optional timeout.
///
/// Children are killed when the future is dropped, so a timed-out or
/// cancelled task never leaves a subprocess behind.
pub async fn run_command(
    program: &str,
    args: &[&str],
    envs: &[(String, String)],
    working_dir: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    for (key, value) in envs {
        cmd.env(key, value);
    }

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    debug!("Running command: {} {}", program, args.join(" "));

    let output = if let Some(timeout_duration) = timeout {
        match tokio::time::timeout(timeout_duration, cmd.output()).await {
            Ok(output) => output.context(format!("Failed to execute {}", program))?,
            Err(_) => anyhow::bail!(
                "Command {} timed out after {:?}",
                program,
                timeout_duration
            ),
        }
    } else {
        cmd.output()
            .await
            .context(format!("Failed to execute {}", program))?
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr.trim());
        anyhow::bail!(
            "Command failed with exit code {:?}: {}",
            output.status.code(),
            stderr.trim()
        );
    }

    Ok(output)
}

/// Run a command and report only whether it exited successfully. Unlike
/// `run_command`, a nonzero exit is an ordinary `false`, not an error.
pub async fn run_command_succeeds(
    program: &str,
    args: &[&str],
    working_dir: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<bool> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let status = if let Some(timeout_duration) = timeout {
        match tokio::time::timeout(timeout_duration, cmd.status()).await {
            Ok(status) => status.context(format!("Failed to execute {}", program))?,
            Err(_) => anyhow::bail!(
                "Command {} timed out after {:?}",
                program,
                timeout_duration
            ),
        }
    } else {
        cmd.status()
            .await
            .context(format!("Failed to execute {}", program))?
    };

    Ok(status.success())
}

/// Run a command and return stdout as a string.
pub async fn run_command_stdout(
    program: &str,
    args: &[&str],
    envs: &[(String, String)],
    working_dir: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<String> {
    let output = run_command(program, args, envs, working_dir, timeout).await?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
