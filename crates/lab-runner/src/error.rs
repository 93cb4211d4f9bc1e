//! Error types for the overseer
//!
//! Experiment-local failures are recorded as statuses, not errors. A
//! `LabError` either ends one experiment as `blocked` (worktree creation) or
//! aborts the invocation.

use lab_core::PlanError;
use lab_ledger::LedgerError;
use std::path::PathBuf;

/// Overseer error type
#[derive(Debug, thiserror::Error)]
pub enum LabError {
    /// Plan could not be loaded
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    /// Ledger could not be written
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Worktree for an experiment could not be created
    #[error("worktree add failed for {id}: {message}")]
    Worktree { id: String, message: String },

    /// Daemon start command could not be spawned
    #[error("cannot start daemon `{command}`: {source}")]
    DaemonStart {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Device capture could not be started
    #[error("cannot start device telemetry `{command}`: {message}")]
    Telemetry { command: String, message: String },

    /// Run artifact could not be written
    #[error("cannot write {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Artifact could not be serialized
    #[error("cannot encode artifact: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LabError {
    /// True when the invocation must stop
    #[inline]
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        !matches!(self, Self::Worktree { .. } | Self::Telemetry { .. })
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktree_failure_is_experiment_local() {
        let err = LabError::Worktree {
            id: "gl-blit".to_string(),
            message: "fatal: invalid reference: main".to_string(),
        };
        assert!(!err.is_run_fatal());
        assert_eq!(
            err.to_string(),
            "worktree add failed for gl-blit: fatal: invalid reference: main"
        );
    }

    #[test]
    fn daemon_failure_is_fatal() {
        let err = LabError::DaemonStart {
            command: "mirrord".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.is_run_fatal());
    }
}
