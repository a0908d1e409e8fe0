//! Bounded external command execution.
//!
//! Every invocation spawns one short-lived process, waits at most the given
//! timeout, and on expiry kills and reaps the child before returning. There
//! are no retries at this layer; retry policy belongs to the caller.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ProcessError;

/// Runs external commands.
///
/// The seam between the daemon and the host: production uses
/// [`SystemRunner`], tests script the tool's output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and returns its stdout.
    ///
    /// Returns within `timeout` plus process teardown time.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ProcessError>;

    /// Starts `program` without waiting for it (used to launch the front-end).
    ///
    /// Returns the child's PID when the platform reports one.
    fn spawn_detached(&self, program: &str, args: &[String]) -> Result<Option<u32>, ProcessError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ProcessError> {
        debug!(program, ?args, timeout_ms = timeout.as_millis() as u64, "Running command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailure {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let outcome = tokio::time::timeout(timeout, async {
            tokio::join!(
                read_pipe(&mut stdout),
                read_pipe(&mut stderr),
                child.wait()
            )
        })
        .await;

        let (out, err, status) = match outcome {
            Ok(finished) => finished,
            Err(_) => {
                // kill() also waits, so the child is reaped before we return
                if let Err(e) = child.kill().await {
                    warn!(program, error = %e, "Failed to kill timed out command");
                }
                return Err(ProcessError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        let status = status.map_err(|e| ProcessError::SpawnFailure {
            program: program.to_string(),
            reason: format!("wait failed: {e}"),
        })?;

        if !status.success() {
            return Err(ProcessError::NonZeroExit {
                program: program.to_string(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&err).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn spawn_detached(&self, program: &str, args: &[String]) -> Result<Option<u32>, ProcessError> {
        // Dropping the handle leaves the process running; tokio reaps it on exit.
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailure {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        Ok(child.id())
    }
}

/// Reads a captured pipe to the end. Read errors end the read early.
async fn read_pipe<R: AsyncRead + Unpin>(pipe: &mut Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe.as_mut() {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Pipe read ended early");
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = SystemRunner
            .run("sh", &args(&["-c", "echo registered=0"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.trim(), "registered=0");
    }

    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let err = SystemRunner
            .run(
                "sh",
                &args(&["-c", "echo boom >&2; exit 3"]),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProcessError::NonZeroExit {
                program: "sh".to_string(),
                code: Some(3),
                stderr: "boom".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_run_spawn_failure() {
        let err = SystemRunner
            .run("/nonexistent/linphonecsh", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailure { .. }));
    }

    #[tokio::test]
    async fn test_run_timeout_kills_child() {
        let started = std::time::Instant::now();
        let err = SystemRunner
            .run("sleep", &args(&["30"]), Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_detached_returns_immediately() {
        let started = std::time::Instant::now();
        let pid = SystemRunner.spawn_detached("sleep", &args(&["1"])).unwrap();
        assert!(pid.is_some());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
