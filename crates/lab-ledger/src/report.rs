//! Analysis report

use crate::analyzer::{failure_patterns, rank_by, Direction, FailurePatterns, RankedEntry};
use crate::ledger::LedgerHistory;
use crate::suggest::{suggest_next, Suggestion, SuggestionContext};
use lab_core::json::to_ascii_pretty;
use lab_core::ExperimentStatus;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Rankings over the latest record per id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rankings {
    /// Lowest rtt average first
    pub by_rtt_avg_ms: Vec<RankedEntry>,
    /// Highest fps first
    pub by_fps: Vec<RankedEntry>,
    /// Lowest jitter first
    pub by_jitter_ms: Vec<RankedEntry>,
}

/// Everything `lab-analyze` prints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Records in the raw history
    pub total_entries: usize,
    /// Distinct experiment ids
    pub unique_experiments: usize,
    /// Metric rankings
    pub rankings: Rankings,
    /// Status and failure aggregates
    pub failure_patterns: FailurePatterns,
    /// Proposed next experiments
    pub suggested_next: Vec<Suggestion>,
}

impl AnalysisReport {
    /// Build the report from a loaded history
    #[must_use]
    pub fn from_history(history: &LedgerHistory) -> Self {
        let latest = history.latest_per_id();
        let ctx = SuggestionContext {
            latest: &latest,
            history: history.entries(),
        };

        Self {
            total_entries: history.len(),
            unique_experiments: latest.len(),
            rankings: Rankings {
                by_rtt_avg_ms: rank_by(&latest, "rtt_avg_ms", Direction::Ascending),
                by_fps: rank_by(&latest, "fps", Direction::Descending),
                by_jitter_ms: rank_by(&latest, "jitter_ms", Direction::Ascending),
            },
            failure_patterns: failure_patterns(history.entries()),
            suggested_next: suggest_next(&ctx),
        }
    }

    /// Human-readable rendering
    #[must_use]
    pub fn render_text(&self, ledger: &Path) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "LATENCY LAB — EXPERIMENT ANALYSIS");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Ledger: {}", ledger.display());
        let _ = writeln!(
            out,
            "Total entries: {} | Unique experiments: {}",
            self.total_entries, self.unique_experiments
        );
        out.push('\n');

        out.push_str("Status distribution:\n");
        for (status, count) in &self.failure_patterns.status_distribution {
            let _ = writeln!(out, "  {status}: {count}");
        }
        out.push('\n');

        out.push_str("Rankings by RTT (lower is better):\n");
        for row in &self.rankings.by_rtt_avg_ms {
            let marker = match row.status {
                ExperimentStatus::Passed => "✓",
                ExperimentStatus::Failed => "✗",
                _ => "?",
            };
            let value = row
                .value
                .map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}ms"));
            let _ = writeln!(out, "   {marker} {}: {value}", row.id);
        }
        out.push('\n');

        out.push_str("Rankings by FPS (higher is better):\n");
        for row in &self.rankings.by_fps {
            let value = row
                .value
                .map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}"));
            let _ = writeln!(out, "    {}: {value}", row.id);
        }
        out.push('\n');

        if !self.failure_patterns.top_failure_reasons.is_empty() {
            out.push_str("Top failure reasons:\n");
            for (reason, count) in &self.failure_patterns.top_failure_reasons {
                let _ = writeln!(out, "  [{count}x] {reason}");
            }
            out.push('\n');
        }

        if !self.failure_patterns.blocked_commands.is_empty() {
            out.push_str("Blocked commands:\n");
            for command in &self.failure_patterns.blocked_commands {
                let _ = writeln!(out, "  {command}");
            }
            out.push('\n');
        }

        out.push_str("Suggested next experiments:\n");
        for suggestion in &self.suggested_next {
            let _ = writeln!(out, "  → {}: {}", suggestion.id, suggestion.rationale);
        }
        out
    }

    /// Indented JSON rendering
    ///
    /// Non-ASCII characters in ids and reasons are written as `\uXXXX` escapes.
    pub fn render_json(&self) -> serde_json::Result<String> {
        to_ascii_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_test_utils::{record_with_metric, result_with};

    fn history() -> LedgerHistory {
        LedgerHistory::new(vec![
            record_with_metric("baseline", ExperimentStatus::Passed, "rtt_avg_ms", 21.04),
            result_with("lz4-fast", ExperimentStatus::Failed, &["fps 10 < min 15"]),
            record_with_metric("lz4-fast", ExperimentStatus::Failed, "rtt_avg_ms", 30.0),
            result_with("gl-blit", ExperimentStatus::Blocked, &["Command failed: make"]),
        ])
    }

    #[test]
    fn counts_raw_and_unique() {
        let report = AnalysisReport::from_history(&history());
        assert_eq!(report.total_entries, 4);
        assert_eq!(report.unique_experiments, 3);
        let rtt: Vec<_> = report
            .rankings
            .by_rtt_avg_ms
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(rtt, vec!["baseline", "lz4-fast", "gl-blit"]);
    }

    #[test]
    fn text_has_markers_and_sections() {
        let report = AnalysisReport::from_history(&history());
        let text = report.render_text(Path::new("ledger.jsonl"));
        assert!(text.contains("LATENCY LAB — EXPERIMENT ANALYSIS"));
        assert!(text.contains("✓ baseline: 21.0ms"));
        assert!(text.contains("✗ lz4-fast: 30.0ms"));
        assert!(text.contains("? gl-blit: N/A"));
        assert!(text.contains("[1x] fps 10 < min 15"));
        assert!(text.contains("→ adaptive-backpressure"));
    }

    #[test]
    fn json_uses_wire_field_names() {
        let report = AnalysisReport::from_history(&history());
        let value: serde_json::Value = serde_json::from_str(&report.render_json().unwrap()).unwrap();
        assert_eq!(value["unique_experiments"], 3);
        assert_eq!(value["rankings"]["by_rtt_avg_ms"][0]["id"], "baseline");
        assert!(value["rankings"]["by_rtt_avg_ms"][2]["value"].is_null());
        assert!(value["rankings"]["by_rtt_avg_ms"][0].get("status").is_none());
        assert_eq!(value["failure_patterns"]["status_distribution"]["failed"], 2);
    }

    #[test]
    fn json_escapes_non_ascii() {
        let history = LedgerHistory::new(vec![result_with(
            "café-vsync",
            ExperimentStatus::Failed,
            &["jitter 9ms ≥ max 5"],
        )]);
        let json = AnalysisReport::from_history(&history).render_json().unwrap();
        assert!(json.is_ascii());
        assert!(json.contains("caf\\u00e9-vsync"));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value["failure_patterns"]["top_failure_reasons"]["jitter 9ms ≥ max 5"],
            1
        );
    }
}
