//! Ledger errors

use std::path::PathBuf;

/// Errors raised while reading or appending to the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Filesystem failure on the ledger file
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be serialized
    #[error("cannot encode ledger record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
