use std::fs::File;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::error::{DeployError, DeployResult};

/// Executes external programs on the host.
///
/// Every host mutation goes through this trait so the pipeline
/// can be driven against a recording fake in tests.
pub trait Shell {
    /// Run a command and capture its stdout. Fails on a non-zero
    /// exit code.
    fn run(&self, program: &str, args: &[&str]) -> DeployResult<String>;

    /// Run a command and return its stdout whatever the exit code.
    /// For status queries that answer through the exit code.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> DeployResult<String>;

    /// Run a command with stdout written byte-for-byte to `path`.
    /// Fails on a non-zero exit code.
    fn run_to_file(&self, program: &str, args: &[&str], path: &Path) -> DeployResult<()>;

    /// Run a command with stdin/stdout/stderr inherited.
    fn run_interactive(&self, program: &str, args: &[&str]) -> DeployResult<()>;

    /// Run a command that reads its stdin from a byte slice.
    fn run_with_stdin(&self, program: &str, args: &[&str], stdin_data: &[u8])
    -> DeployResult<String>;

    /// Check if a command resolves on `PATH`.
    fn command_exists(&self, program: &str) -> bool;

    /// Run `args` as `user` through `sudo -u <user> -H`.
    fn run_as(&self, user: &str, program: &str, args: &[&str]) -> DeployResult<String> {
        self.run("sudo", &sudo_args(user, program, args))
    }
}

/// `sudo` arguments running `program args` as `user`.
#[must_use]
pub fn sudo_args<'a>(user: &'a str, program: &'a str, args: &[&'a str]) -> Vec<&'a str> {
    let mut full = vec!["-u", user, "-H", program];
    full.extend_from_slice(args);
    full
}

/// The real host shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

impl Shell for System {
    fn run(&self, program: &str, args: &[&str]) -> DeployResult<String> {
        run(program, args)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> DeployResult<String> {
        run_unchecked(program, args)
    }

    fn run_to_file(&self, program: &str, args: &[&str], path: &Path) -> DeployResult<()> {
        run_to_file(program, args, path)
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> DeployResult<()> {
        run_interactive(program, args)
    }

    fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        stdin_data: &[u8],
    ) -> DeployResult<String> {
        run_with_stdin(program, args, stdin_data)
    }

    fn command_exists(&self, program: &str) -> bool {
        command_exists(program)
    }
}

/// Run a command and capture its output. Fails if the command
/// returns a non-zero exit code.
pub fn run(program: &str, args: &[&str]) -> DeployResult<String> {
    debug!(command = %format_command(program, args), "run");
    let output = spawn(program, args)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(failure(program, args, &output))
    }
}

/// Run a command and capture its stdout even when it exits
/// non-zero.
pub fn run_unchecked(program: &str, args: &[&str]) -> DeployResult<String> {
    debug!(command = %format_command(program, args), "run unchecked");
    let output = spawn(program, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a command with its stdout redirected into a new file at
/// `path`. The bytes are not decoded or trimmed.
pub fn run_to_file(program: &str, args: &[&str], path: &Path) -> DeployResult<()> {
    debug!(command = %format_command(program, args), path = %path.display(), "run to file");
    let file = File::create(path)?;
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(file))
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| not_found_or_io(program, e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(failure(program, args, &output))
    }
}

/// Run a command with stdin/stdout/stderr inherited (interactive).
pub fn run_interactive(program: &str, args: &[&str]) -> DeployResult<()> {
    debug!(command = %format_command(program, args), "run interactive");
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| not_found_or_io(program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(DeployError::CommandFailed {
            command: format_command(program, args),
            code: status.code(),
            stderr: String::new(),
        })
    }
}

/// Run a command that pipes its stdin from a byte slice.
pub fn run_with_stdin(program: &str, args: &[&str], stdin_data: &[u8]) -> DeployResult<String> {
    use std::io::Write;

    debug!(command = %format_command(program, args), "run with stdin");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| not_found_or_io(program, e))?;

    if let Some(stdin) = &mut child.stdin {
        stdin.write_all(stdin_data)?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(failure(program, args, &output))
    }
}

/// Check if a command exists on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

fn spawn(program: &str, args: &[&str]) -> DeployResult<Output> {
    Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| not_found_or_io(program, e))
}

fn failure(program: &str, args: &[&str], output: &Output) -> DeployError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let command = format_command(program, args);
    debug!(%command, %stderr, "command failed");
    DeployError::CommandFailed {
        command,
        code: output.status.code(),
        stderr,
    }
}

fn not_found_or_io(program: &str, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::CommandNotFound(program.to_string())
    } else {
        DeployError::Io(e)
    }
}

/// Join a program and its arguments for display.
#[must_use]
pub fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}
