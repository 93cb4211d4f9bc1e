//! Pipeline daemon lifecycle
//!
//! In `spawn` mode the overseer owns the daemon process for the whole
//! invocation. Teardown consumes the controller, so it runs at most once,
//! and it never fails: what happened is returned as a [`TeardownRecord`].

use crate::command::CommandExecutor;
use crate::error::LabError;
use crate::process::{stop_child, StopOutcome, StopSignal};
use lab_core::{CommandResult, DaemonConfig, DaemonMode};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Grace period between SIGTERM and kill for the daemon
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Daemon state reported in the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonState {
    /// Configured mode
    pub mode: DaemonMode,
    /// Whether a start was performed (or simulated in a dry run)
    pub started: bool,
    /// Pid of the spawned daemon
    pub spawned_pid: Option<u32>,
}

/// What teardown did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownRecord {
    /// False when the mode left the daemon alone
    pub stopped: bool,
    /// Result of the stop command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandResult>,
    /// How the spawned child ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<StopOutcome>,
}

/// Owns the daemon process
pub struct DaemonController {
    config: DaemonConfig,
    repo_root: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    child: Option<Child>,
    state: DaemonState,
}

impl DaemonController {
    /// Create a controller; nothing is started yet
    pub fn new(
        config: DaemonConfig,
        repo_root: impl Into<PathBuf>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let state = DaemonState {
            mode: config.mode,
            started: false,
            spawned_pid: None,
        };
        Self {
            config,
            repo_root: repo_root.into(),
            executor,
            child: None,
            state,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &DaemonState {
        &self.state
    }

    /// Start the daemon in spawn mode and wait the startup grace period
    ///
    /// Failure to spawn is fatal for the invocation.
    pub async fn start(&mut self, dry_run: bool) -> Result<(), LabError> {
        if self.config.mode != DaemonMode::Spawn {
            return Ok(());
        }
        let Some(argv) = self.config.start_argv()? else {
            return Ok(());
        };
        if dry_run {
            self.state.started = true;
            return Ok(());
        }

        let (program, args) = argv.split_first().ok_or_else(|| LabError::DaemonStart {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;
        let child = Command::new(program)
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LabError::DaemonStart {
                command: argv.join(" "),
                source,
            })?;

        self.state.started = true;
        self.state.spawned_pid = child.id();
        self.child = Some(child);
        info!(command = %argv.join(" "), pid = ?self.state.spawned_pid, "daemon spawned");

        let wait = self.config.startup_wait();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    /// Stop the daemon
    ///
    /// Runs the stop command if one is configured, then terminates the
    /// spawned child if it is still alive.
    pub async fn teardown(mut self, dry_run: bool) -> TeardownRecord {
        if self.config.mode != DaemonMode::Spawn {
            return TeardownRecord {
                stopped: false,
                command: None,
                child: None,
            };
        }

        let command = match self.config.stop_argv() {
            Ok(Some(argv)) if dry_run => Some(CommandResult::dry_run(&argv)),
            Ok(Some(argv)) => {
                let result = self
                    .executor
                    .run(&argv, &self.repo_root, self.config.stop_timeout())
                    .await;
                if !result.success() {
                    warn!(command = %result.command_line(), exit_code = ?result.exit_code, "daemon stop command failed");
                }
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "invalid daemon stop command");
                None
            }
        };

        let child = match self.child.take() {
            Some(mut child) if !dry_run => {
                let outcome = stop_child(&mut child, StopSignal::Terminate, TERMINATE_GRACE).await;
                info!(?outcome, "daemon stopped");
                Some(outcome)
            }
            _ => None,
        };

        TeardownRecord {
            stopped: true,
            command,
            child,
        }
    }
}
