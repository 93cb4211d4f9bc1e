//! Testing utilities for the latency lab workspace
//!
//! Shared fixtures for results, summaries and plans.

#![allow(missing_docs)]

use lab_core::{
    parse_status_text, CommandResult, ExperimentPlan, ExperimentResult, ExperimentSpec,
    ExperimentStatus, MetricSample, MetricsSummary,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Summary built from `key=value` status blocks, one block per sample
pub fn summary_from_status(blocks: &[&str]) -> MetricsSummary {
    let samples: Vec<MetricSample> = blocks
        .iter()
        .map(|b| MetricSample::now(parse_status_text(b)))
        .collect();
    MetricsSummary::from_samples(&samples)
}

/// One-sample summary carrying a single average
pub fn summary_with_average(key: &str, value: f64) -> MetricsSummary {
    MetricsSummary {
        sample_count: 1,
        averages: BTreeMap::from([(key.to_string(), value)]),
        ..MetricsSummary::empty()
    }
}

pub fn result_with(id: &str, status: ExperimentStatus, reasons: &[&str]) -> ExperimentResult {
    ExperimentResult::builder(id)
        .with_status(status)
        .with_reasons(reasons.iter().map(|r| (*r).to_string()))
        .build()
}

pub fn record_with_metric(
    id: &str,
    status: ExperimentStatus,
    key: &str,
    value: f64,
) -> ExperimentResult {
    ExperimentResult::builder(id)
        .with_status(status)
        .with_metrics(summary_with_average(key, value))
        .build()
}

/// Blocked record whose only command is `command`
pub fn blocked_by(id: &str, command: CommandResult) -> ExperimentResult {
    let reason = format!("Command failed: {}", command.command_line());
    let mut builder = ExperimentResult::builder(id).with_status(ExperimentStatus::Blocked);
    builder.push_command(command);
    builder.push_reason(reason);
    builder.build()
}

/// Command result with the given exit code
pub fn command_result(argv: &[&str], exit_code: Option<i32>, stderr: &str) -> CommandResult {
    let argv: Vec<String> = argv.iter().map(|a| (*a).to_string()).collect();
    let mut result = CommandResult::dry_run(&argv);
    result.exit_code = exit_code;
    result.stderr = stderr.to_string();
    result
}

/// Plan with short timings, results under `root`
pub fn quick_plan(root: &Path, experiments: Vec<ExperimentSpec>) -> ExperimentPlan {
    ExperimentPlan {
        experiments,
        poll_interval_s: 1.0,
        default_warmup_s: 0.0,
        default_measure_s: 3.0,
        results_dir: root.join("results"),
        status_file: root.join("status"),
        status_socket: root.join("status.sock"),
        ..ExperimentPlan::default()
    }
}

/// Write `plan` as JSON and return its path
pub fn write_plan(dir: &Path, plan: &ExperimentPlan) -> std::path::PathBuf {
    let path = dir.join("plan.json");
    std::fs::write(&path, serde_json::to_string_pretty(plan).unwrap()).unwrap();
    path
}
