//! Latency Lab Runner
//!
//! Executes an experiment plan against a live streaming pipeline:
//! - Per-experiment git worktrees and setup commands
//! - Optional ownership of the pipeline daemon
//! - Status sampling over the IPC socket or the status file
//! - Optional device telemetry captured alongside each window
//! - Gate evaluation, ledger append and per-run artifacts
//!
//! External commands go through [`CommandExecutor`] and status reads through
//! [`StatusSource`], so the whole sequence can be driven without processes.

#![warn(unreachable_pub)]

pub mod artifacts;
pub mod bridge;
pub mod command;
pub mod daemon;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod sampler;
pub mod worktree;

pub use artifacts::{RunDirectory, RunSummary, SummaryRow};
pub use bridge::{BridgeSession, DeviceCapture, TelemetryBridge};
pub use command::{CommandExecutor, ProcessRunner};
pub use daemon::{DaemonController, DaemonState, TeardownRecord};
pub use error::LabError;
pub use orchestrator::{Orchestrator, RunOptions, RunReport, StatusCounts, DRY_RUN_REASON};
pub use process::{stop_child, StopOutcome, StopSignal};
pub use sampler::{FileStatus, MetricSampler, StatusSource};
#[cfg(unix)]
pub use sampler::SocketStatus;
pub use worktree::WorktreeManager;
