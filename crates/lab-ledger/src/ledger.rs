//! Append-only result ledger
//!
//! One ASCII-safe JSON object per line. Records are never rewritten; the
//! current view of an experiment is its last record.

use crate::error::LedgerError;
use indexmap::IndexMap;
use lab_core::json::to_ascii_line;
use lab_core::{ExperimentResult, ExperimentStatus};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Handle on a ledger file
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Ledger at `path`; the file is created on first append
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the ledger file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line
    pub fn append(&self, result: &ExperimentResult) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        let mut line = to_ascii_line(result)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| LedgerError::io(&self.path, e))?;

        debug!(experiment = %result.id(), status = %result.status(), "ledger record appended");
        Ok(())
    }

    /// Read the whole history
    ///
    /// A missing file is an empty history. Blank and unparseable lines are
    /// skipped.
    pub fn load(&self) -> Result<LedgerHistory, LedgerError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LedgerHistory::default()),
            Err(e) => return Err(LedgerError::io(&self.path, e)),
        };

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ExperimentResult>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    skipped += 1;
                    debug!(line = number + 1, error = %e, "skipping unparseable ledger line");
                }
            }
        }
        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "ledger contained unparseable lines");
        }
        Ok(LedgerHistory::new(entries))
    }
}

/// Raw ledger history in file order
#[derive(Debug, Clone, Default)]
pub struct LedgerHistory {
    entries: Vec<ExperimentResult>,
}

impl LedgerHistory {
    /// Wrap records in file order
    #[must_use]
    pub fn new(entries: Vec<ExperimentResult>) -> Self {
        Self { entries }
    }

    /// Every record, oldest first
    #[must_use]
    pub fn entries(&self) -> &[ExperimentResult] {
        &self.entries
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for an empty or missing ledger
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last record per id, keyed in order of each id's first appearance
    #[must_use]
    pub fn latest_per_id(&self) -> IndexMap<&str, &ExperimentResult> {
        let mut latest = IndexMap::new();
        for entry in &self.entries {
            latest.insert(entry.id(), entry);
        }
        latest
    }

    /// Records with the given status across the whole history
    #[must_use]
    pub fn count_status(&self, status: ExperimentStatus) -> usize {
        self.entries.iter().filter(|e| e.status() == status).count()
    }
}
