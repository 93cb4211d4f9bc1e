//! External command execution
//!
//! Every command the overseer runs (setup steps, `git worktree`, daemon stop,
//! device clear) goes through a [`CommandExecutor`]. The production
//! implementation spawns a process; tests substitute scripted executors.

use async_trait::async_trait;
use lab_core::CommandResult;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs one command to completion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `argv` in `cwd`, killing it after `timeout`
    ///
    /// Never fails: spawn errors and timeouts are reported in the result.
    async fn run(&self, argv: &[String], cwd: &Path, timeout: Duration) -> CommandResult;
}

/// Executor backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn run(&self, argv: &[String], cwd: &Path, timeout: Duration) -> CommandResult {
        let Some((program, args)) = argv.split_first() else {
            let err = std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command");
            return CommandResult::spawn_failure(argv, &err);
        };

        let started = Instant::now();
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %argv.join(" "), error = %e, "failed to spawn command");
                return CommandResult::spawn_failure(argv, &e);
            }
        };

        debug!(command = %argv.join(" "), cwd = %cwd.display(), "command started");

        // Dropping the pending wait drops the child, which kills it.
        let outcome = tokio::time::timeout(timeout, child.wait_with_output()).await;
        let duration_s = started.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(output)) => CommandResult {
                argv: argv.to_vec(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                duration_s,
                timed_out: false,
            },
            Ok(Err(e)) => {
                warn!(command = %argv.join(" "), error = %e, "failed to collect command output");
                CommandResult {
                    duration_s,
                    ..CommandResult::spawn_failure(argv, &e)
                }
            }
            Err(_) => {
                warn!(
                    command = %argv.join(" "),
                    timeout_s = timeout.as_secs_f64(),
                    "command timed out; killed"
                );
                CommandResult {
                    argv: argv.to_vec(),
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {:.1}s", timeout.as_secs_f64()),
                    duration_s,
                    timed_out: true,
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| (*a).to_string()).collect()
    }

    #[tokio::test]
    async fn captures_trimmed_output_and_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ProcessRunner
            .run(
                &argv(&["sh", "-c", "echo ' out '; echo err >&2; exit 3"]),
                dir.path(),
                Duration::from_secs(10),
            )
            .await;

        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, "out");
        assert_eq!(result.stderr, "err");
        assert!(!result.success());
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        let result = ProcessRunner
            .run(&argv(&["ls"]), dir.path(), Duration::from_secs(10))
            .await;
        assert!(result.success());
        assert!(result.stdout.contains("marker"));
    }

    #[tokio::test]
    async fn timeout_kills_and_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ProcessRunner
            .run(&argv(&["sleep", "30"]), dir.path(), Duration::from_millis(200))
            .await;
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(result.duration_s < 10.0);
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ProcessRunner
            .run(
                &argv(&["definitely-not-a-real-binary-4242"]),
                dir.path(),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(result.exit_code, None);
        assert!(!result.stderr.is_empty());
    }
}
