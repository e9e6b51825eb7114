#![deny(clippy::all, warnings)]

//! Process plumbing for the container runtime: captured runs, passthrough
//! children, and replacing the current process image.

use std::{
    io::{self, Read},
    path::Path,
    process::{Command, Stdio},
    thread,
};

use anyhow::{Context, Result};
use tracing::debug;

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

fn max_capture_bytes() -> usize {
    std::env::var("PILOT_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Environment handed to a child process.
#[derive(Debug, Clone, Default)]
pub enum ProcessEnv {
    /// Inherit the parent's table unchanged.
    #[default]
    Inherit,
    /// Inherit and add/override these variables.
    Extend(Vec<(String, String)>),
    /// Start from an empty table holding exactly these variables.
    Exact(Vec<(String, String)>),
}

fn configured_command(program: &str, args: &[String], env: &ProcessEnv, cwd: &Path) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    match env {
        ProcessEnv::Inherit => {}
        ProcessEnv::Extend(vars) => {
            command.envs(vars.iter().map(|(k, v)| (k, v)));
        }
        ProcessEnv::Exact(vars) => {
            command.env_clear();
            command.envs(vars.iter().map(|(k, v)| (k, v)));
        }
    }
    command.current_dir(cwd);
    command
}

/// Execute a program and capture stdout/stderr.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely.
pub fn run_command(
    program: &str,
    args: &[String],
    env: &ProcessEnv,
    cwd: &Path,
) -> Result<RunOutput> {
    debug!(program, ?args, "running captured command");
    let mut command = configured_command(program, args, env, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;
    let limit = max_capture_bytes();
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, limit));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let code = status.code().unwrap_or(-1);
    let (mut stdout, stdout_truncated) = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let (mut stderr, stderr_truncated) = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;
    if stdout_truncated {
        stdout.push_str("\n[...truncated...]\n");
    }
    if stderr_truncated {
        stderr.push_str("\n[...truncated...]\n");
    }
    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

/// Execute a program as a child with inherited stdio and return its exit
/// status.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned.
pub fn run_command_passthrough(
    program: &str,
    args: &[String],
    env: &ProcessEnv,
    cwd: &Path,
) -> Result<i32> {
    debug!(program, ?args, "running passthrough command");
    let mut command = configured_command(program, args, env, cwd);
    command.stdin(Stdio::inherit());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    let status = command
        .status()
        .with_context(|| format!("failed to start {program}"))?;
    Ok(status.code().unwrap_or(-1))
}

/// Replace the current process with `program`.
///
/// Only returns when the replacement could not happen; the returned error
/// describes why.
#[cfg(unix)]
pub fn exec_replace(program: &str, args: &[String], env: &ProcessEnv, cwd: &Path) -> io::Error {
    use std::os::unix::process::CommandExt;

    debug!(program, ?args, "replacing process image");
    configured_command(program, args, env, cwd).exec()
}

/// Fallback without process replacement: run the program as a child with
/// inherited stdio, then exit with its status.
#[cfg(not(unix))]
pub fn exec_replace(program: &str, args: &[String], env: &ProcessEnv, cwd: &Path) -> io::Error {
    debug!(program, ?args, "running in place of the current process");
    match configured_command(program, args, env, cwd).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(err) => err,
    }
}

/// Conventional shell exit status for a program that could not be started.
#[must_use]
pub fn spawn_failure_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => 127,
        io::ErrorKind::PermissionDenied => 126,
        _ => 1,
    }
}

fn read_to_string_limited(mut reader: impl Read, limit: usize) -> Result<(String, bool)> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    Ok((String::from_utf8_lossy(&buffer).to_string(), truncated))
}

fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 {
        return;
    }
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[cfg(unix)]
    #[test]
    fn run_command_captures_output_and_status_unix() -> Result<()> {
        let output = run_command(
            "/bin/sh",
            &[
                "-c".to_string(),
                "printf out && printf err >&2; exit 7".to_string(),
            ],
            &ProcessEnv::Inherit,
            Path::new("."),
        )?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn exact_env_replaces_parent_table() -> Result<()> {
        let output = run_command(
            "/bin/sh",
            &[
                "-c".to_string(),
                "printf '%s|%s' \"$ONLY\" \"${HOME:-unset}\"".to_string(),
            ],
            &ProcessEnv::Exact(vec![("ONLY".to_string(), "yes".to_string())]),
            Path::new("."),
        )?;
        assert_eq!(output.stdout, "yes|unset");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn passthrough_propagates_status() -> Result<()> {
        let code = run_command_passthrough(
            "/bin/sh",
            &["-c".to_string(), "exit 3".to_string()],
            &ProcessEnv::Inherit,
            Path::new("."),
        )?;
        assert_eq!(code, 3);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn exec_replace_reports_missing_program() {
        let err = exec_replace(
            "/nonexistent/pilot-runtime-binary",
            &[],
            &ProcessEnv::Inherit,
            Path::new("."),
        );
        assert_eq!(spawn_failure_code(&err), 127);
    }

    #[test]
    fn append_limited_keeps_tail() {
        let mut buffer = Vec::new();
        let mut truncated = false;
        append_limited(&mut buffer, b"abcdef", 4, &mut truncated);
        assert!(truncated);
        assert_eq!(buffer, b"cdef");
    }
}
