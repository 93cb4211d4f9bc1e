//! Rankings and failure patterns over the ledger

use indexmap::IndexMap;
use lab_core::{ExperimentResult, ExperimentStatus};
use serde::Serialize;
use std::cmp::Ordering;

/// Number of entries kept in the reason and command listings
pub const TOP_N: usize = 10;

/// Sort direction of a ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lower is better
    Ascending,
    /// Higher is better
    Descending,
}

/// One row of a ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// Experiment id
    pub id: String,
    /// Window average of the ranked metric, if recorded
    pub value: Option<f64>,
    /// Status of the latest record
    #[serde(skip)]
    pub status: ExperimentStatus,
}

/// Rank the latest records by the window average of `key`
///
/// Experiments without the metric go last; ties keep map order.
#[must_use]
pub fn rank_by(
    latest: &IndexMap<&str, &ExperimentResult>,
    key: &str,
    direction: Direction,
) -> Vec<RankedEntry> {
    let mut rows: Vec<RankedEntry> = latest
        .iter()
        .map(|(id, result)| RankedEntry {
            id: (*id).to_string(),
            value: result.metrics().average(key),
            status: result.status(),
        })
        .collect();

    rows.sort_by(|a, b| match (a.value, b.value) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    rows
}

/// Aggregates over the raw history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailurePatterns {
    /// Record count per status, in order of first appearance
    pub status_distribution: IndexMap<String, usize>,
    /// Most frequent reasons of failed and blocked records
    pub top_failure_reasons: IndexMap<String, usize>,
    /// Failing command lines of blocked records, oldest first
    pub blocked_commands: Vec<String>,
}

/// Count statuses, failure reasons and blocking commands
#[must_use]
pub fn failure_patterns(history: &[ExperimentResult]) -> FailurePatterns {
    let mut status_distribution: IndexMap<String, usize> = IndexMap::new();
    let mut reason_counts: IndexMap<String, usize> = IndexMap::new();
    let mut blocked_commands = Vec::new();

    for entry in history {
        *status_distribution
            .entry(entry.status().as_str().to_string())
            .or_default() += 1;

        if matches!(
            entry.status(),
            ExperimentStatus::Failed | ExperimentStatus::Blocked
        ) {
            for reason in entry.reasons() {
                *reason_counts.entry(reason.clone()).or_default() += 1;
            }
        }

        if entry.status() == ExperimentStatus::Blocked {
            blocked_commands.extend(
                entry
                    .command_results()
                    .iter()
                    .filter(|c| !c.success())
                    .map(lab_core::CommandResult::command_line),
            );
        }
    }

    let mut reasons: Vec<(String, usize)> = reason_counts.into_iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1));
    reasons.truncate(TOP_N);
    blocked_commands.truncate(TOP_N);

    FailurePatterns {
        status_distribution,
        top_failure_reasons: reasons.into_iter().collect(),
        blocked_commands,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerHistory;
    use lab_test_utils::{blocked_by, command_result, record_with_metric, result_with};
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_values_rank_last() {
        let history = LedgerHistory::new(vec![
            result_with("a", ExperimentStatus::Passed, &[]),
            record_with_metric("b", ExperimentStatus::Passed, "rtt_avg_ms", 12.0),
            record_with_metric("c", ExperimentStatus::Passed, "rtt_avg_ms", 9.0),
        ]);
        let ranking = rank_by(&history.latest_per_id(), "rtt_avg_ms", Direction::Ascending);
        let ids: Vec<_> = ranking.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(ranking[2].value, None);
    }

    #[test]
    fn descending_keeps_ties_stable() {
        let history = LedgerHistory::new(vec![
            record_with_metric("x", ExperimentStatus::Passed, "fps", 30.0),
            record_with_metric("y", ExperimentStatus::Failed, "fps", 45.0),
            record_with_metric("z", ExperimentStatus::Passed, "fps", 30.0),
        ]);
        let ranking = rank_by(&history.latest_per_id(), "fps", Direction::Descending);
        let ids: Vec<_> = ranking.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[test]
    fn patterns_count_raw_history() {
        let blocked = command_result(&["make", "build"], Some(2), "no rule");
        let history = vec![
            result_with("a", ExperimentStatus::Failed, &["fps 10 < min 15"]),
            result_with("a", ExperimentStatus::Failed, &["fps 10 < min 15"]),
            blocked_by("b", blocked),
            result_with("c", ExperimentStatus::Passed, &["met configured gates"]),
        ];

        let patterns = failure_patterns(&history);
        assert_eq!(patterns.status_distribution["failed"], 2);
        assert_eq!(patterns.status_distribution["blocked"], 1);
        assert_eq!(patterns.status_distribution["passed"], 1);
        assert_eq!(patterns.top_failure_reasons["fps 10 < min 15"], 2);
        assert!(!patterns.top_failure_reasons.contains_key("met configured gates"));
        assert_eq!(patterns.blocked_commands, vec!["make build".to_string()]);

        let order: Vec<_> = patterns.status_distribution.keys().cloned().collect();
        assert_eq!(order, vec!["failed", "blocked", "passed"]);
    }

    #[test]
    fn reasons_are_capped() {
        let history: Vec<_> = (0..15)
            .map(|i| result_with("a", ExperimentStatus::Failed, &[format!("reason {i}").as_str()]))
            .collect();
        assert_eq!(failure_patterns(&history).top_failure_reasons.len(), TOP_N);
    }
}
