//! Error types for plan loading
//!
//! A `PlanError` aborts the whole invocation before anything is recorded.

use std::path::PathBuf;

/// Errors raised while loading or validating an experiment plan
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Plan file could not be read
    #[error("cannot read plan {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Plan document is not valid for its format
    #[error("cannot parse plan {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Plan declares no experiments
    #[error("no experiments in plan")]
    NoExperiments,

    /// Experiment without an id
    #[error("experiment #{0} has an empty id")]
    EmptyExperimentId(usize),

    /// Id that is not usable as a single file name
    #[error("experiment id {0:?} must be a single path component")]
    UnsafeExperimentId(String),

    /// Two experiments share an id
    #[error("duplicate experiment id: {0}")]
    DuplicateExperiment(String),

    /// Command string could not be split into argv
    #[error("invalid command in {context}: {command:?}")]
    InvalidCommand { context: String, command: String },

    /// Negative, non-finite or zero (where forbidden) duration
    #[error("invalid duration for {field}: {value}")]
    InvalidDuration { field: String, value: f64 },

    /// Spawn mode without a start command
    #[error("daemon mode 'spawn' requires a start command")]
    MissingDaemonStart,
}

impl PlanError {
    /// Create parse error for path
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create command error for a given location in the plan
    pub fn invalid_command(context: impl Into<String>, command: impl Into<String>) -> Self {
        Self::InvalidCommand {
            context: context.into(),
            command: command.into(),
        }
    }
}
