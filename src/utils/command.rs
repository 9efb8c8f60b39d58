//! Command execution primitives with consistent error handling.
//!
//! Every external tool runs through these helpers so the environment
//! overlay, logging, and failure formatting stay uniform.

use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::env::EnvOverlay;
use crate::error::{Error, Result};
use crate::log_status;

/// Run a command in a directory under the environment overlay, capturing
/// output.
///
/// Returns trimmed stdout if the command succeeds.
/// Returns an error with stderr (or stdout fallback) if it fails.
pub fn run_in_env<I, S>(
    dir: &Path,
    program: &str,
    args: I,
    env: &EnvOverlay,
    context: &str,
) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).current_dir(dir);
    env.apply_to(&mut command);
    let output = command.output().map_err(|e| {
        Error::internal_io(
            format!("Failed to run {context}: {e}"),
            Some(context.to_string()),
        )
    })?;

    if !output.status.success() {
        return Err(Error::command_failed(context, error_text(&output)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a command with inherited stdio so its output streams into the
/// pipeline log as it happens. The command line is logged first.
pub fn run_streamed<I, S>(
    dir: &Path,
    program: &str,
    args: I,
    env: &EnvOverlay,
    context: &str,
) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<String> = args
        .into_iter()
        .map(|a| a.as_ref().to_string_lossy().to_string())
        .collect();
    log_status!("Running: {} {}", program, args.join(" "));
    let mut command = Command::new(program);
    command.args(&args).current_dir(dir);
    env.apply_to(&mut command);
    let status = command.status().map_err(|e| {
        Error::internal_io(
            format!("Failed to run {context}: {e}"),
            Some(context.to_string()),
        )
    })?;

    if !status.success() {
        return Err(Error::command_failed(context, format!("exit {status}")));
    }
    Ok(())
}

/// Feed bytes to a command's stdin and wait for it to finish, stdout and
/// stderr inherited.
pub fn run_with_stdin<I, S>(
    dir: &Path,
    program: &str,
    args: I,
    env: &EnvOverlay,
    input: &[u8],
    context: &str,
) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).current_dir(dir).stdin(Stdio::piped());
    env.apply_to(&mut command);
    let mut child = command.spawn().map_err(|e| {
        Error::internal_io(
            format!("Failed to run {context}: {e}"),
            Some(context.to_string()),
        )
    })?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input)?;
    }
    let status = child.wait().map_err(|e| {
        Error::internal_io(
            format!("Failed to wait for {context}: {e}"),
            Some(context.to_string()),
        )
    })?;

    if !status.success() {
        return Err(Error::command_failed(context, format!("exit {status}")));
    }
    Ok(())
}

/// Run a command in a directory, returning None on failure instead of an
/// error. For probes where failure is an answer.
pub fn run_in_optional<I, S>(dir: &Path, program: &str, args: I, env: &EnvOverlay) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).current_dir(dir);
    env.apply_to(&mut command);
    let output = command.output().ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

/// Extract error text from command output.
///
/// Prefers stderr, falls back to stdout if stderr is empty.
pub fn error_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}
