//! Tool process execution with timeout support.
//!
//! Every backend funnels through [`run_with_timeout`]: spawn, poll, kill at
//! the deadline. A timeout is a result (`exit_code` 124), not an error, so
//! callers treat slow tools the same way they treat failing ones.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Exit code reported for a tool that exceeded its wall-clock budget.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Default per-tool wall-clock budget for external tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured outcome of one command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (124 on timeout, -1 when unavailable).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Whether execution exceeded the budget.
    pub timed_out: bool,
    /// Total wall-clock duration.
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command in `working_dir`, killing it once `timeout` elapses.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    working_dir: &Path,
    timeout: Duration,
) -> Result<CommandOutput> {
    let start = Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn command: {program}"))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child
            .try_wait()
            .with_context(|| format!("failed to poll command: {program}"))?
        {
            Some(status) => {
                return Ok(CommandOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: read_pipe(child.stdout.take()),
                    stderr: read_pipe(child.stderr.take()),
                    timed_out: false,
                    duration: start.elapsed(),
                });
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();

                    let mut stderr = read_pipe(child.stderr.take());
                    stderr.push_str(&format!(
                        "\n{} timed out after {}",
                        program,
                        humantime::format_duration(timeout)
                    ));

                    return Ok(CommandOutput {
                        exit_code: TIMEOUT_EXIT_CODE,
                        stdout: read_pipe(child.stdout.take()),
                        stderr,
                        timed_out: true,
                        duration: start.elapsed(),
                    });
                }

                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

fn read_pipe<R: Read>(stream: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buffer);
    }
    String::from_utf8_lossy(&buffer).to_string()
}

/// Check if a command exists on PATH.
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Full path to a command on PATH, if any.
pub fn which(program: &str) -> Option<std::path::PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = run_with_timeout(
            "sh",
            &["-c".to_string(), "echo hello".to_string()],
            Path::new("."),
            Duration::from_secs(5),
        )
        .expect("run");
        assert!(out.success());
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("hello"));
        assert!(!out.timed_out);
    }

    #[test]
    fn nonzero_exit_is_a_result_not_an_error() {
        let out = run_with_timeout(
            "sh",
            &["-c".to_string(), "echo oops >&2; exit 3".to_string()],
            Path::new("."),
            Duration::from_secs(5),
        )
        .expect("run");
        assert!(!out.success());
        assert_eq!(out.exit_code, 3);
        assert!(out.stderr.contains("oops"));
    }

    #[test]
    fn timeout_yields_exit_code_124() {
        let out = run_with_timeout(
            "sh",
            &["-c".to_string(), "sleep 10".to_string()],
            Path::new("."),
            Duration::from_millis(100),
        )
        .expect("run");
        assert!(out.timed_out);
        assert_eq!(out.exit_code, TIMEOUT_EXIT_CODE);
        assert!(out.stderr.contains("timed out"));
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = run_with_timeout(
            "this-command-does-not-exist-xyz123",
            &[],
            Path::new("."),
            Duration::from_secs(1),
        );
        assert!(err.is_err());
    }

    #[test]
    fn command_exists_finds_sh() {
        assert!(command_exists("sh"));
        assert!(!command_exists("this-command-does-not-exist-xyz123"));
    }
}
