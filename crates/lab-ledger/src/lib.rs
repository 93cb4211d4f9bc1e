//! Latency Lab Ledger
//!
//! Durable record of experiment outcomes and the analysis built on it:
//! - `Ledger`: append-only JSON-lines file of `ExperimentResult` records
//! - `LedgerHistory`: raw history plus the latest-per-id view
//! - Rankings and failure patterns
//! - Ordered suggestion rules for the next experiments
//! - `AnalysisReport` with text and JSON rendering

#![warn(unreachable_pub)]

pub mod analyzer;
pub mod error;
pub mod ledger;
pub mod report;
pub mod suggest;

pub use analyzer::{failure_patterns, rank_by, Direction, FailurePatterns, RankedEntry};
pub use error::LedgerError;
pub use ledger::{Ledger, LedgerHistory};
pub use report::{AnalysisReport, Rankings};
pub use suggest::{suggest_next, Suggestion, SuggestionContext};

/// Default ledger location relative to the repo root
pub const DEFAULT_LEDGER_PATH: &str = "experiments/results/ledger.jsonl";
