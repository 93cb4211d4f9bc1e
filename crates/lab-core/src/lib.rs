//! Latency Lab Core
//!
//! Shared model for the experiment overseer:
//! - Experiment plans and their defaults
//! - Status-channel parsing and metric summaries
//! - Device telemetry line parsing
//! - Quality gate evaluation
//! - The ledger record (`ExperimentResult`)
//! - ASCII-safe JSON encoding and subscriber setup
//!
//! # Example
//!
//! ```rust
//! use lab_core::{evaluate, ExperimentStatus, GateConfig, MetricsSummary};
//!
//! let gates = GateConfig::default().with_fps_min(15.0);
//! let outcome = evaluate(&MetricsSummary::empty(), None, &gates);
//!
//! // No telemetry arrived: that is a sampling gap, not a gate violation.
//! assert_eq!(outcome.status, ExperimentStatus::Blocked);
//! ```

#![warn(unreachable_pub)]

pub mod device;
pub mod error;
pub mod gate;
pub mod json;
pub mod logging;
pub mod metrics;
pub mod plan;
pub mod ring;
pub mod types;

pub use device::{parse_device_line, DeviceCounters, DeviceSample, DeviceSummary};
pub use error::PlanError;
pub use gate::{evaluate, Evaluation, GateConfig};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{
    parse_status_text, strip_acknowledgement, MetricSample, MetricValue, MetricsSummary,
    MONOTONIC_KEYS, NUMERIC_KEYS,
};
pub use plan::{
    CommandLine, DaemonConfig, DaemonMode, DeviceTelemetryConfig, ExperimentPlan, ExperimentSpec,
    PlanFormat, WorktreeConfig,
};
pub use ring::SampleRing;
pub use types::{CommandResult, ExperimentResult, ExperimentResultBuilder, ExperimentStatus};
