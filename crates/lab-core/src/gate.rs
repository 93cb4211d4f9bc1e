//! Quality gates
//!
//! Absolute checks run against the candidate summary alone; baseline-relative
//! checks compare candidate and baseline averages. Every check is independent
//! and all violations are reported.

use crate::metrics::{round3, MetricsSummary};
use crate::types::ExperimentStatus;
use serde::{Deserialize, Serialize};

/// Reason attached to a summary without samples
pub const NO_SAMPLES_REASON: &str =
    "No status samples captured. Ensure the pipeline is running and publishing status.";

/// Reason attached to a passing evaluation
pub const PASSED_REASON: &str = "met configured gates";

/// Gate thresholds; an absent threshold disables its check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum average fps
    pub fps_min: Option<f64>,
    /// Maximum average jitter in ms
    pub jitter_ms_max: Option<f64>,
    /// Maximum growth of the skipped-frame counter over the window
    pub skipped_frames_delta_max: Option<f64>,
    /// Maximum rtt average increase over the baseline
    pub rtt_avg_delta_max: Option<f64>,
    /// Maximum rtt p95 increase over the baseline
    pub rtt_p95_delta_max: Option<f64>,
}

impl GateConfig {
    /// Set fps floor
    #[inline]
    #[must_use]
    pub fn with_fps_min(mut self, value: f64) -> Self {
        self.fps_min = Some(value);
        self
    }

    /// Set jitter ceiling
    #[inline]
    #[must_use]
    pub fn with_jitter_ms_max(mut self, value: f64) -> Self {
        self.jitter_ms_max = Some(value);
        self
    }

    /// Set skipped-frame delta ceiling
    #[inline]
    #[must_use]
    pub fn with_skipped_frames_delta_max(mut self, value: f64) -> Self {
        self.skipped_frames_delta_max = Some(value);
        self
    }

    /// Set rtt average regression ceiling
    #[inline]
    #[must_use]
    pub fn with_rtt_avg_delta_max(mut self, value: f64) -> Self {
        self.rtt_avg_delta_max = Some(value);
        self
    }

    /// Set rtt p95 regression ceiling
    #[inline]
    #[must_use]
    pub fn with_rtt_p95_delta_max(mut self, value: f64) -> Self {
        self.rtt_p95_delta_max = Some(value);
        self
    }
}

/// Gate outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// `passed`, `failed` or `blocked`
    pub status: ExperimentStatus,
    /// Violations, or a single explanatory reason
    pub reasons: Vec<String>,
}

/// Classify a summary against the gates and an optional baseline
///
/// Violations make the experiment `failed`. A summary without samples is
/// `blocked` whatever the gates say.
#[must_use]
pub fn evaluate(
    summary: &MetricsSummary,
    baseline: Option<&MetricsSummary>,
    gates: &GateConfig,
) -> Evaluation {
    if summary.is_empty() {
        return Evaluation {
            status: ExperimentStatus::Blocked,
            reasons: vec![NO_SAMPLES_REASON.to_string()],
        };
    }

    let mut reasons = Vec::new();

    if let (Some(min), Some(fps)) = (gates.fps_min, summary.average("fps")) {
        if fps < min {
            reasons.push(format!("fps {fps} < min {min}"));
        }
    }

    if let (Some(max), Some(jitter)) = (gates.jitter_ms_max, summary.average("jitter_ms")) {
        if jitter > max {
            reasons.push(format!("jitter_ms {jitter} > max {max}"));
        }
    }

    if let (Some(max), Some(skipped)) = (
        gates.skipped_frames_delta_max,
        summary.delta("skipped_frames"),
    ) {
        if skipped > max {
            reasons.push(format!("skipped_frames delta {skipped} > max {max}"));
        }
    }

    if let Some(baseline) = baseline {
        let relative = [
            ("rtt_avg_ms", gates.rtt_avg_delta_max),
            ("rtt_p95_ms", gates.rtt_p95_delta_max),
        ];
        for (key, ceiling) in relative {
            let (Some(max), Some(candidate), Some(base)) =
                (ceiling, summary.average(key), baseline.average(key))
            else {
                continue;
            };
            let delta = candidate - base;
            if delta > max {
                reasons.push(format!("{key} delta +{} > max {max}", round3(delta)));
            }
        }
    }

    if reasons.is_empty() {
        Evaluation {
            status: ExperimentStatus::Passed,
            reasons: vec![PASSED_REASON.to_string()],
        }
    } else {
        Evaluation {
            status: ExperimentStatus::Failed,
            reasons,
        }
    }
}
