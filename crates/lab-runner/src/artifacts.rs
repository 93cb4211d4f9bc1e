//! Per-run artifact directory

use crate::daemon::DaemonState;
use crate::error::LabError;
use chrono::{DateTime, Local, Utc};
use lab_core::json::to_ascii_pretty;
use lab_core::{ExperimentResult, ExperimentStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Timestamped directory holding one invocation's artifacts
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create `<results_dir>/<YYYYMMDD-HHMMSS>` using local time
    pub fn create(results_dir: &Path) -> Result<Self, LabError> {
        let name = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let path = results_dir.join(name);
        std::fs::create_dir_all(&path).map_err(|e| LabError::artifact(&path, e))?;
        Ok(Self { path })
    }

    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `value` as pretty ASCII-safe JSON to `<dir>/<name>`
    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf, LabError> {
        let path = self.path.join(name);
        let mut text = to_ascii_pretty(value)?;
        text.push('\n');
        std::fs::write(&path, text).map_err(|e| LabError::artifact(&path, e))?;
        debug!(path = %path.display(), "artifact written");
        Ok(path)
    }
}

/// One line of the run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    /// Experiment id
    pub id: String,
    /// Final status
    pub status: ExperimentStatus,
    /// Reasons for the status
    pub reasons: Vec<String>,
}

impl From<&ExperimentResult> for SummaryRow {
    fn from(result: &ExperimentResult) -> Self {
        Self {
            id: result.id().to_string(),
            status: result.status(),
            reasons: result.reasons().to_vec(),
        }
    }
}

/// Contents of `summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// When the invocation started
    pub started_at: DateTime<Utc>,
    /// Plan file the run was loaded from
    pub plan: PathBuf,
    /// Artifact directory
    pub run_dir: PathBuf,
    /// Whether commands and sampling were skipped
    pub dry_run: bool,
    /// Daemon state at the end of the sequence
    pub daemon: DaemonState,
    /// Per-experiment outcome in execution order
    pub summary: Vec<SummaryRow>,
}
