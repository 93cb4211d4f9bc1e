//! Status-channel samples and their reduction
//!
//! The pipeline publishes newline-delimited `key=value` text. A fixed set of
//! keys is numeric; everything else passes through as text. A window of
//! samples is reduced to a [`MetricsSummary`].

use crate::device::DeviceSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keys coerced to floating point when parsed from the status channel
pub const NUMERIC_KEYS: &[&str] = &[
    "fps",
    "bandwidth_mbps",
    "jitter_ms",
    "rtt_avg_ms",
    "rtt_p95_ms",
    "total_frames",
    "skipped_frames",
    "grey_ms",
    "compress_ms",
];

/// Counters that only grow; the summary reports `last - first` for these
pub const MONOTONIC_KEYS: &[&str] = &["total_frames", "skipped_frames"];

/// One value read from the status channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Value of a numeric key
    Number(f64),
    /// Any other key, verbatim
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

/// Timestamped reading of the status channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// When the sample was taken
    pub sample_ts: DateTime<Utc>,
    /// Parsed key/value pairs
    #[serde(flatten)]
    pub values: BTreeMap<String, MetricValue>,
}

impl MetricSample {
    /// Create a sample stamped with the current time
    ///
    /// A `sample_ts` key read from the channel is replaced by the stamp.
    #[must_use]
    pub fn now(mut values: BTreeMap<String, MetricValue>) -> Self {
        values.remove("sample_ts");
        Self {
            sample_ts: Utc::now(),
            values,
        }
    }

    /// Numeric value for `key`, if present
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(MetricValue::as_f64)
    }
}

/// Drop the acknowledgement line an IPC response starts with
///
/// The socket answers `OK` before the `key=value` body.
#[must_use]
pub fn strip_acknowledgement(response: &str) -> &str {
    let trimmed = response.trim_start();
    match trimmed.split_once('\n') {
        Some((first, rest)) if first.trim().starts_with("OK") => rest,
        None if trimmed.trim().starts_with("OK") => "",
        _ => trimmed,
    }
}

/// Parse `key=value` lines
///
/// Lines without `=` are ignored. Numeric keys that fail to parse (or parse
/// to a non-finite value) are left out rather than defaulted.
#[must_use]
pub fn parse_status_text(text: &str) -> BTreeMap<String, MetricValue> {
    let mut values = BTreeMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            continue;
        }
        if NUMERIC_KEYS.contains(&key) {
            match value.parse::<f64>() {
                Ok(v) if v.is_finite() => {
                    values.insert(key.to_string(), MetricValue::Number(v));
                }
                _ => {
                    values.remove(key);
                }
            }
        } else {
            values.insert(key.to_string(), MetricValue::Text(value.to_string()));
        }
    }
    values
}

/// Reduction of one sampling window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Number of samples collected
    pub sample_count: usize,
    /// Mean of each numeric key over the samples where it was present
    #[serde(default)]
    pub averages: BTreeMap<String, f64>,
    /// First sample of the window
    #[serde(default)]
    pub first: Option<MetricSample>,
    /// Last sample of the window
    #[serde(default)]
    pub last: Option<MetricSample>,
    /// `last - first` for monotonic counters
    #[serde(default)]
    pub deltas: BTreeMap<String, f64>,
    /// Device-side telemetry merged from the bridge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceSummary>,
}

impl MetricsSummary {
    /// Summary of a window in which nothing arrived
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reduce samples in arrival order
    #[must_use]
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return Self::empty();
        };

        let mut averages = BTreeMap::new();
        for key in NUMERIC_KEYS {
            let present: Vec<f64> = samples.iter().filter_map(|s| s.number(key)).collect();
            if let Some(avg) = mean(&present) {
                averages.insert((*key).to_string(), round3(avg));
            }
        }

        let mut deltas = BTreeMap::new();
        for key in MONOTONIC_KEYS {
            if let (Some(a), Some(b)) = (first.number(key), last.number(key)) {
                deltas.insert((*key).to_string(), round3(b - a));
            }
        }

        Self {
            sample_count: samples.len(),
            averages,
            first: Some(first.clone()),
            last: Some(last.clone()),
            deltas,
            device: None,
        }
    }

    /// Merge device telemetry into the summary
    #[must_use]
    pub fn with_device(mut self, device: DeviceSummary) -> Self {
        self.device = Some(device);
        self
    }

    /// True when no sample was collected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Window average for `key`
    #[inline]
    #[must_use]
    pub fn average(&self, key: &str) -> Option<f64> {
        self.averages.get(key).copied()
    }

    /// Counter delta for `key`
    #[inline]
    #[must_use]
    pub fn delta(&self, key: &str) -> Option<f64> {
        self.deltas.get(key).copied()
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(text: &str) -> MetricSample {
        MetricSample::now(parse_status_text(text))
    }

    #[test]
    fn parse_coerces_numeric_keys_only() {
        let values = parse_status_text("fps=29.5\nmode=comfortable\nrtt_avg_ms= 21 \n");
        assert_eq!(values.get("fps"), Some(&MetricValue::Number(29.5)));
        assert_eq!(values.get("rtt_avg_ms"), Some(&MetricValue::Number(21.0)));
        assert_eq!(
            values.get("mode"),
            Some(&MetricValue::Text("comfortable".to_string()))
        );
    }

    #[test]
    fn unparseable_numeric_value_is_absent_not_zero() {
        let values = parse_status_text("fps=n/a\njitter_ms=inf\nnoise line\n=orphan");
        assert!(values.is_empty());
    }

    #[test]
    fn acknowledgement_is_dropped() {
        assert_eq!(strip_acknowledgement("OK\nfps=30\n"), "fps=30\n");
        assert_eq!(strip_acknowledgement("fps=30\n"), "fps=30\n");
        assert_eq!(strip_acknowledgement("OK"), "");
    }

    #[test]
    fn averages_only_count_present_values() {
        let samples = vec![
            sample("fps=30\ntotal_frames=100\nskipped_frames=2"),
            sample("fps=bad\ntotal_frames=160"),
            sample("fps=20\ntotal_frames=220\nskipped_frames=5"),
        ];
        let summary = MetricsSummary::from_samples(&samples);

        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.average("fps"), Some(25.0));
        assert_eq!(summary.delta("total_frames"), Some(120.0));
        assert_eq!(summary.delta("skipped_frames"), Some(3.0));
        assert_eq!(summary.delta("fps"), None);
        assert_eq!(summary.first.as_ref(), samples.first());
        assert_eq!(summary.last.as_ref(), samples.last());
    }

    #[test]
    fn delta_needs_counter_on_both_ends() {
        let samples = vec![sample("skipped_frames=1"), sample("fps=30")];
        let summary = MetricsSummary::from_samples(&samples);
        assert_eq!(summary.delta("skipped_frames"), None);
    }

    #[test]
    fn no_samples_gives_explicit_empty_summary() {
        let summary = MetricsSummary::from_samples(&[]);
        assert!(summary.is_empty());
        assert!(summary.averages.is_empty());
        assert!(summary.first.is_none());
    }

    #[test]
    fn averages_are_rounded_to_three_decimals() {
        let samples = vec![sample("jitter_ms=1"), sample("jitter_ms=1"), sample("jitter_ms=2")];
        let summary = MetricsSummary::from_samples(&samples);
        assert_eq!(summary.average("jitter_ms"), Some(1.333));
    }

    #[test]
    fn sample_serializes_flat() {
        let s = sample("fps=30\nmode=x");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["fps"], serde_json::json!(30.0));
        assert_eq!(json["mode"], serde_json::json!("x"));
        assert!(json.get("sample_ts").is_some());

        let back: MetricSample = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn channel_timestamp_key_is_replaced_by_stamp() {
        let s = sample("fps=30\nsample_ts=abc");
        assert!(!s.values.contains_key("sample_ts"));

        let text = serde_json::to_string(&s).unwrap();
        assert_eq!(text.matches("\"sample_ts\"").count(), 1);
        let back: MetricSample = serde_json::from_str(&text).unwrap();
        assert_eq!(back, s);
    }
}
