//! Device-side telemetry lines
//!
//! The receiver logs one stats line per second:
//!
//! ```text
//! FPS: 28.5 | recv: 20.0ms | lz4: 3.0ms | delta: 4.6ms | neon: 5.6ms | vsync: 0.7ms | 294KB delta | drops: 1 | overwritten: 0 | total: 827
//! ```
//!
//! The pattern may appear anywhere within a logcat line.

use crate::metrics::{mean, round3};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static STATS_LINE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(concat!(
        r"FPS:\s*(?P<fps>[\d.]+)\s*\|\s*",
        r"recv:\s*(?P<recv_ms>[\d.]+)ms\s*\|\s*",
        r"lz4:\s*(?P<lz4_ms>[\d.]+)ms\s*\|\s*",
        r"delta:\s*(?P<delta_ms>[\d.]+)ms\s*\|\s*",
        r"neon:\s*(?P<neon_ms>[\d.]+)ms\s*\|\s*",
        r"vsync:\s*(?P<vsync_ms>[\d.]+)ms\s*\|\s*",
        r"(?P<frame_kb>\d+)KB\s+(?P<frame_type>\w+)\s*\|\s*",
        r"drops:\s*(?P<drops>\d+)\s*\|\s*",
        r"overwritten:\s*(?P<overwritten>\d+)\s*\|\s*",
        r"total:\s*(?P<total>\d+)",
    ))
    .ok()
});

/// Timing keys averaged in a [`DeviceSummary`]
pub const DEVICE_TIMING_KEYS: &[&str] =
    &["fps", "recv_ms", "lz4_ms", "delta_ms", "neon_ms", "vsync_ms"];

/// One parsed stats line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSample {
    /// When the line was read
    pub ts: DateTime<Utc>,
    /// Frames per second on the device
    pub fps: f64,
    /// Receive time
    pub recv_ms: f64,
    /// Decompression time
    pub lz4_ms: f64,
    /// Delta application time
    pub delta_ms: f64,
    /// Conversion time
    pub neon_ms: f64,
    /// Wait for vsync
    pub vsync_ms: f64,
    /// Frame size in kilobytes
    pub frame_kb: u64,
    /// `key` or `delta`
    pub frame_type: String,
    /// Dropped frames so far
    pub drops: u64,
    /// Overwritten frames so far
    pub overwritten: u64,
    /// Frames received so far
    pub total: u64,
}

impl DeviceSample {
    fn timing(&self, key: &str) -> Option<f64> {
        match key {
            "fps" => Some(self.fps),
            "recv_ms" => Some(self.recv_ms),
            "lz4_ms" => Some(self.lz4_ms),
            "delta_ms" => Some(self.delta_ms),
            "neon_ms" => Some(self.neon_ms),
            "vsync_ms" => Some(self.vsync_ms),
            _ => None,
        }
    }
}

/// Parse a stats line, returning `None` for anything else
#[must_use]
pub fn parse_device_line(line: &str) -> Option<DeviceSample> {
    let caps = STATS_LINE.as_ref()?.captures(line)?;
    let float = |name: &str| caps.name(name)?.as_str().parse::<f64>().ok();
    let int = |name: &str| caps.name(name)?.as_str().parse::<u64>().ok();

    Some(DeviceSample {
        ts: Utc::now(),
        fps: float("fps")?,
        recv_ms: float("recv_ms")?,
        lz4_ms: float("lz4_ms")?,
        delta_ms: float("delta_ms")?,
        neon_ms: float("neon_ms")?,
        vsync_ms: float("vsync_ms")?,
        frame_kb: int("frame_kb")?,
        frame_type: caps.name("frame_type")?.as_str().to_string(),
        drops: int("drops")?,
        overwritten: int("overwritten")?,
        total: int("total")?,
    })
}

/// Counters from the last stats line of a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCounters {
    /// Dropped frames
    pub drops: u64,
    /// Overwritten frames
    pub overwritten: u64,
    /// Frames received
    pub total: u64,
    /// Type of the last frame
    pub frame_type: String,
}

/// Reduction of the device samples of one measurement window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Number of stats lines parsed
    pub sample_count: usize,
    /// Average of each timing key
    #[serde(default)]
    pub averages: BTreeMap<String, f64>,
    /// Counters of the last line
    #[serde(default)]
    pub last: Option<DeviceCounters>,
}

impl DeviceSummary {
    /// Reduce samples in arrival order
    #[must_use]
    pub fn from_samples(samples: &[DeviceSample]) -> Self {
        let Some(last) = samples.last() else {
            return Self::default();
        };

        let averages = DEVICE_TIMING_KEYS
            .iter()
            .filter_map(|key| {
                let values: Vec<f64> = samples.iter().filter_map(|s| s.timing(key)).collect();
                mean(&values).map(|avg| ((*key).to_string(), round3(avg)))
            })
            .collect();

        Self {
            sample_count: samples.len(),
            averages,
            last: Some(DeviceCounters {
                drops: last.drops,
                overwritten: last.overwritten,
                total: last.total,
                frame_type: last.frame_type.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LINE: &str = "I/DaylightMirror( 4242): FPS: 28.5 | recv: 20.0ms | lz4: 3.0ms | \
                        delta: 4.6ms | neon: 5.6ms | vsync: 0.7ms | 294KB delta | drops: 1 | \
                        overwritten: 0 | total: 827";

    #[test]
    fn parses_line_embedded_in_logcat_prefix() {
        let sample = parse_device_line(LINE).unwrap();
        assert_eq!(sample.fps, 28.5);
        assert_eq!(sample.recv_ms, 20.0);
        assert_eq!(sample.vsync_ms, 0.7);
        assert_eq!(sample.frame_kb, 294);
        assert_eq!(sample.frame_type, "delta");
        assert_eq!(sample.drops, 1);
        assert_eq!(sample.total, 827);
    }

    #[test]
    fn ignores_other_lines() {
        assert!(parse_device_line("--------- beginning of main").is_none());
        assert!(parse_device_line("FPS: 30 | recv: fast").is_none());
    }

    #[test]
    fn summary_averages_timings_and_keeps_last_counters() {
        let first = parse_device_line(LINE).unwrap();
        let second = parse_device_line(
            "FPS: 30.5 | recv: 22.0ms | lz4: 3.0ms | delta: 4.6ms | neon: 5.6ms | vsync: 0.7ms \
             | 512KB key | drops: 2 | overwritten: 1 | total: 857",
        )
        .unwrap();

        let summary = DeviceSummary::from_samples(&[first, second]);
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.averages.get("fps"), Some(&29.5));
        assert_eq!(summary.averages.get("recv_ms"), Some(&21.0));
        assert_eq!(
            summary.last,
            Some(DeviceCounters {
                drops: 2,
                overwritten: 1,
                total: 857,
                frame_type: "key".to_string(),
            })
        );
    }

    #[test]
    fn empty_summary() {
        let summary = DeviceSummary::from_samples(&[]);
        assert_eq!(summary.sample_count, 0);
        assert!(summary.last.is_none());
    }
}
