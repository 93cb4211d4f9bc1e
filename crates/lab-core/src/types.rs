//! Result records
//!
//! Defines what the overseer writes for every experiment:
//! - Outcome status
//! - Captured command results
//! - The immutable `ExperimentResult` ledger record and its builder

use crate::metrics::MetricsSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of one experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// All configured gates held
    Passed,
    /// At least one gate was violated
    Failed,
    /// Could not be measured (setup failure, no samples, worktree error)
    Blocked,
    /// Nothing was executed
    DryRun,
}

impl ExperimentStatus {
    /// Every status, in reporting order
    pub const ALL: [Self; 4] = [Self::Passed, Self::Failed, Self::Blocked, Self::DryRun];

    /// Wire name of the status
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::DryRun => "dry_run",
        }
    }

    /// Statuses that keep the exit code at zero
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Passed | Self::DryRun)
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured outcome of one external command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Command line as executed
    pub argv: Vec<String>,
    /// Exit code; absent when killed, timed out or never spawned
    pub exit_code: Option<i32>,
    /// Trimmed standard output
    #[serde(default)]
    pub stdout: String,
    /// Trimmed standard error
    #[serde(default)]
    pub stderr: String,
    /// Wall-clock duration in seconds
    #[serde(default)]
    pub duration_s: f64,
    /// Set when the command hit its timeout
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandResult {
    /// Record for a command that was not executed
    #[must_use]
    pub fn dry_run(argv: &[String]) -> Self {
        Self {
            argv: argv.to_vec(),
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration_s: 0.0,
            timed_out: false,
        }
    }

    /// Record for a command that could not be spawned
    #[must_use]
    pub fn spawn_failure(argv: &[String], error: &std::io::Error) -> Self {
        Self {
            argv: argv.to_vec(),
            exit_code: None,
            stdout: String::new(),
            stderr: error.to_string(),
            duration_s: 0.0,
            timed_out: false,
        }
    }

    /// True for exit code zero
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Arguments joined by spaces
    #[must_use]
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// Standard error, or standard output when stderr is empty
    #[must_use]
    pub fn output_excerpt(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Ledger record for one experiment
///
/// Immutable once built; fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    id: String,
    status: ExperimentStatus,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    #[serde(default)]
    worktree: PathBuf,
    #[serde(default)]
    command_results: Vec<CommandResult>,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    metrics: MetricsSummary,
    #[serde(default)]
    notes: String,
}

impl ExperimentResult {
    /// Start building a record; `started_at` is stamped now
    #[must_use]
    pub fn builder(id: impl Into<String>) -> ExperimentResultBuilder {
        ExperimentResultBuilder::new(id)
    }

    /// Experiment id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Outcome
    #[must_use]
    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// When work on the experiment started
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the record was produced
    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Resolved working directory
    #[must_use]
    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    /// Every attempted command, in order
    #[must_use]
    pub fn command_results(&self) -> &[CommandResult] {
        &self.command_results
    }

    /// Human-readable reasons, in evaluation order
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Measurement summary
    #[must_use]
    pub fn metrics(&self) -> &MetricsSummary {
        &self.metrics
    }

    /// Free-form notes copied from the plan
    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// First command that did not succeed
    #[must_use]
    pub fn failing_command(&self) -> Option<&CommandResult> {
        self.command_results.iter().find(|c| !c.success())
    }
}

/// Builder for [`ExperimentResult`]
#[derive(Debug, Clone)]
pub struct ExperimentResultBuilder {
    id: String,
    status: ExperimentStatus,
    started_at: DateTime<Utc>,
    worktree: PathBuf,
    command_results: Vec<CommandResult>,
    reasons: Vec<String>,
    metrics: MetricsSummary,
    notes: String,
}

impl ExperimentResultBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ExperimentStatus::Blocked,
            started_at: Utc::now(),
            worktree: PathBuf::new(),
            command_results: Vec::new(),
            reasons: Vec::new(),
            metrics: MetricsSummary::empty(),
            notes: String::new(),
        }
    }

    /// Set status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = status;
        self
    }

    /// Override the start timestamp
    #[inline]
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Set the working directory
    #[inline]
    #[must_use]
    pub fn with_worktree(mut self, worktree: impl Into<PathBuf>) -> Self {
        self.worktree = worktree.into();
        self
    }

    /// Set notes
    #[inline]
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Set the measurement summary
    #[inline]
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsSummary) -> Self {
        self.metrics = metrics;
        self
    }

    /// Append one command result
    pub fn push_command(&mut self, result: CommandResult) {
        self.command_results.push(result);
    }

    /// Append one reason
    pub fn push_reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    /// Append several reasons
    #[must_use]
    pub fn with_reasons(mut self, reasons: impl IntoIterator<Item = String>) -> Self {
        self.reasons.extend(reasons);
        self
    }

    /// Command results recorded so far
    #[must_use]
    pub fn command_results(&self) -> &[CommandResult] {
        &self.command_results
    }

    /// Freeze the record, stamping `finished_at`
    #[must_use]
    pub fn build(self) -> ExperimentResult {
        ExperimentResult {
            id: self.id,
            status: self.status,
            started_at: self.started_at,
            finished_at: Utc::now(),
            worktree: self.worktree,
            command_results: self.command_results,
            reasons: self.reasons,
            metrics: self.metrics,
            notes: self.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ExperimentStatus::DryRun).unwrap(),
            "\"dry_run\""
        );
        let parsed: ExperimentStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(parsed, ExperimentStatus::Blocked);
        assert_eq!(ExperimentStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn success_statuses() {
        assert!(ExperimentStatus::Passed.is_success());
        assert!(ExperimentStatus::DryRun.is_success());
        assert!(!ExperimentStatus::Failed.is_success());
        assert!(!ExperimentStatus::Blocked.is_success());
    }

    #[test]
    fn output_excerpt_prefers_stderr() {
        let mut result = CommandResult::dry_run(&["make".to_string()]);
        result.stdout = "built".to_string();
        assert_eq!(result.output_excerpt(), "built");
        result.stderr = "boom".to_string();
        assert_eq!(result.output_excerpt(), "boom");
    }

    #[test]
    fn builder_keeps_order_and_stamps_finish() {
        let mut builder = ExperimentResult::builder("fast-path")
            .with_status(ExperimentStatus::Failed)
            .with_notes("try lz4 level 2");
        builder.push_command(CommandResult::dry_run(&["true".to_string()]));
        builder.push_reason("first");
        builder.push_reason("second");
        let result = builder.build();

        assert_eq!(result.id(), "fast-path");
        assert_eq!(result.reasons(), ["first", "second"]);
        assert_eq!(result.command_results().len(), 1);
        assert!(result.finished_at() >= result.started_at());
        assert!(result.failing_command().is_none());
    }

    #[test]
    fn record_round_trips_through_json() {
        let result = ExperimentResult::builder("a")
            .with_status(ExperimentStatus::Passed)
            .with_worktree("/tmp/a")
            .build();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"status\":\"passed\""));
        let back: ExperimentResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
