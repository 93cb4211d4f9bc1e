//! Sequential experiment execution
//!
//! One invocation walks the plan in declaration order. Each experiment gets a
//! working directory, runs its setup commands, warms up, is sampled (with
//! optional device capture alongside) and is judged against the gates. The
//! daemon is torn down once at the end, whatever happened in between.

use crate::artifacts::{RunDirectory, RunSummary, SummaryRow};
use crate::bridge::{BridgeSession, TelemetryBridge};
use crate::command::{CommandExecutor, ProcessRunner};
use crate::daemon::DaemonController;
use crate::error::LabError;
use crate::sampler::MetricSampler;
use crate::worktree::WorktreeManager;
use chrono::Utc;
use lab_core::{
    evaluate, CommandResult, ExperimentPlan, ExperimentResult, ExperimentSpec, ExperimentStatus,
    MetricsSummary,
};
use lab_ledger::Ledger;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Reason recorded for every experiment of a dry run
pub const DRY_RUN_REASON: &str = "Dry run: commands not executed, metrics not sampled";

/// Invocation switches from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Resolve and record without executing or sampling
    pub dry_run: bool,
    /// Capture device telemetry even when the plan does not enable it
    pub device_telemetry: bool,
}

impl RunOptions {
    /// Set dry-run mode
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Force device capture on
    #[inline]
    #[must_use]
    pub fn with_device_telemetry(mut self, enabled: bool) -> Self {
        self.device_telemetry = enabled;
        self
    }
}

/// Runs a plan
pub struct Orchestrator {
    plan: ExperimentPlan,
    plan_path: PathBuf,
    repo_root: PathBuf,
    options: RunOptions,
    executor: Arc<dyn CommandExecutor>,
    sampler: MetricSampler,
}

impl Orchestrator {
    /// Orchestrator using real processes and the plan's status channels
    ///
    /// `plan` is expected to be validated and resolved against `repo_root`.
    pub fn new(
        plan: ExperimentPlan,
        plan_path: impl Into<PathBuf>,
        repo_root: impl Into<PathBuf>,
        options: RunOptions,
    ) -> Self {
        let sampler = MetricSampler::for_plan(&plan);
        Self {
            plan,
            plan_path: plan_path.into(),
            repo_root: repo_root.into(),
            options,
            executor: Arc::new(ProcessRunner),
            sampler,
        }
    }

    /// Replace the command executor
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the status sampler
    #[must_use]
    pub fn with_sampler(mut self, sampler: MetricSampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Run every experiment, then tear the daemon down
    ///
    /// Experiment-level problems are recorded as statuses. An `Err` means the
    /// invocation itself could not continue (daemon start, ledger or
    /// artifact I/O).
    pub async fn run(self) -> Result<RunReport, LabError> {
        let dry_run = self.options.dry_run;
        let started_at = Utc::now();
        let run_dir = RunDirectory::create(&self.plan.results_dir)?;
        run_dir.write_json("plan.json", &self.plan)?;
        info!(
            run_dir = %run_dir.path().display(),
            experiments = self.plan.experiments.len(),
            dry_run,
            "run started"
        );

        let mut daemon = DaemonController::new(
            self.plan.daemon.clone(),
            &self.repo_root,
            Arc::clone(&self.executor),
        );
        if let Err(e) = daemon.start(dry_run).await {
            let record = daemon.teardown(dry_run).await;
            if let Err(write_err) = run_dir.write_json("stop.json", &record) {
                warn!(error = %write_err, "failed to record daemon teardown");
            }
            return Err(e);
        }

        let outcome = self.run_sequence(&run_dir).await;
        let daemon_state = daemon.state().clone();
        let outcome = outcome.and_then(|results| {
            let summary = RunSummary {
                started_at,
                plan: self.plan_path.clone(),
                run_dir: run_dir.path().to_path_buf(),
                dry_run,
                daemon: daemon_state,
                summary: results.iter().map(SummaryRow::from).collect(),
            };
            run_dir.write_json("summary.json", &summary)?;
            Ok(results)
        });

        let record = daemon.teardown(dry_run).await;
        if let Err(e) = run_dir.write_json("stop.json", &record) {
            warn!(error = %e, "failed to record daemon teardown");
        }

        let results = outcome?;
        let report = RunReport {
            run_dir: run_dir.path().to_path_buf(),
            results,
            dry_run,
        };
        let counts = report.counts();
        info!(
            passed = counts.passed,
            failed = counts.failed,
            blocked = counts.blocked,
            dry_run = counts.dry_run,
            "run finished"
        );
        Ok(report)
    }

    async fn run_sequence(&self, run_dir: &RunDirectory) -> Result<Vec<ExperimentResult>, LabError> {
        let ledger = Ledger::new(self.plan.ledger_path());
        let worktrees = WorktreeManager::new(
            &self.repo_root,
            self.plan.worktree.clone(),
            Arc::clone(&self.executor),
        );
        let mut baseline: Option<MetricsSummary> = None;
        let mut results = Vec::with_capacity(self.plan.experiments.len());

        for spec in &self.plan.experiments {
            let result = self
                .run_experiment(spec, &worktrees, baseline.as_ref(), run_dir)
                .await?;

            if !self.options.dry_run {
                ledger.append(&result)?;
            }
            run_dir.write_json(&format!("{}.json", spec.id), &result)?;

            let is_baseline = self.plan.baseline_id.as_deref() == Some(spec.id.as_str());
            if is_baseline && baseline.is_none() && !result.metrics().is_empty() {
                info!(experiment = %spec.id, "baseline captured");
                baseline = Some(result.metrics().clone());
            }

            info!(
                experiment = %spec.id,
                status = %result.status(),
                reasons = %result.reasons().join("; "),
                "experiment finished"
            );
            results.push(result);
        }
        Ok(results)
    }

    async fn run_experiment(
        &self,
        spec: &ExperimentSpec,
        worktrees: &WorktreeManager,
        baseline: Option<&MetricsSummary>,
        run_dir: &RunDirectory,
    ) -> Result<ExperimentResult, LabError> {
        let dry_run = self.options.dry_run;
        let builder = ExperimentResult::builder(&spec.id).with_notes(spec.notes.clone());
        info!(experiment = %spec.id, "experiment started");

        let cwd = match worktrees.resolve(spec, dry_run).await {
            Ok(path) => path,
            Err(e) if !e.is_run_fatal() => {
                warn!(experiment = %spec.id, error = %e, "worktree unavailable");
                return Ok(builder
                    .with_status(ExperimentStatus::Blocked)
                    .with_reasons([e.to_string()])
                    .build());
            }
            Err(e) => return Err(e),
        };
        let mut builder = builder.with_worktree(&cwd);

        let timeout = self.plan.command_timeout();
        for argv in spec.command_argvs()? {
            if dry_run {
                builder.push_command(CommandResult::dry_run(&argv));
                continue;
            }
            let result = self.executor.run(&argv, &cwd, timeout).await;
            if result.success() {
                builder.push_command(result);
                continue;
            }

            warn!(
                experiment = %spec.id,
                command = %result.command_line(),
                exit_code = ?result.exit_code,
                timed_out = result.timed_out,
                "setup command failed"
            );
            let reasons = failure_reasons(&result);
            builder.push_command(result);
            return Ok(builder
                .with_status(ExperimentStatus::Blocked)
                .with_reasons(reasons)
                .build());
        }

        if dry_run {
            return Ok(builder
                .with_status(ExperimentStatus::DryRun)
                .with_reasons([DRY_RUN_REASON.to_string()])
                .build());
        }

        let warmup = self.plan.warmup_for(spec);
        if !warmup.is_zero() {
            info!(experiment = %spec.id, warmup_s = warmup.as_secs_f64(), "warming up");
            tokio::time::sleep(warmup).await;
        }

        let bridge = self.start_bridge(spec, &cwd).await?;
        let mut summary = self
            .sampler
            .sample(self.plan.measure_for(spec), self.plan.poll_interval())
            .await;
        if let Some(session) = bridge {
            let capture = session.stop().await;
            run_dir.write_json(&format!("{}.device.json", spec.id), &capture)?;
            summary = summary.with_device(capture.summary());
        }

        let evaluation = evaluate(&summary, baseline, &self.plan.gates);
        Ok(builder
            .with_metrics(summary)
            .with_status(evaluation.status)
            .with_reasons(evaluation.reasons)
            .build())
    }

    async fn start_bridge(
        &self,
        spec: &ExperimentSpec,
        cwd: &Path,
    ) -> Result<Option<BridgeSession>, LabError> {
        if !(self.options.device_telemetry || self.plan.device_telemetry.enabled) {
            return Ok(None);
        }
        let bridge = TelemetryBridge::new(
            self.plan.device_telemetry.clone(),
            Arc::clone(&self.executor),
            cwd,
        );
        match bridge.start().await {
            Ok(session) => Ok(Some(session)),
            Err(e) if !e.is_run_fatal() => {
                warn!(experiment = %spec.id, error = %e, "continuing without device telemetry");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn failure_reasons(result: &CommandResult) -> Vec<String> {
    let mut reasons = vec![format!("Command failed: {}", result.command_line())];
    let excerpt = result.output_excerpt();
    if !excerpt.is_empty() {
        reasons.push(excerpt.to_string());
    }
    reasons
}

/// Per-status tallies of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StatusCounts {
    pub passed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub dry_run: usize,
}

/// Outcome of one invocation
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Artifact directory
    pub run_dir: PathBuf,
    /// Results in execution order
    pub results: Vec<ExperimentResult>,
    /// Whether this was a dry run
    pub dry_run: bool,
}

impl RunReport {
    /// 0 when every experiment passed or was a dry run, 2 otherwise
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.results.iter().all(|r| r.status().is_success()) {
            0
        } else {
            2
        }
    }

    /// Tally results by status
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for result in &self.results {
            match result.status() {
                ExperimentStatus::Passed => counts.passed += 1,
                ExperimentStatus::Failed => counts.failed += 1,
                ExperimentStatus::Blocked => counts.blocked += 1,
                ExperimentStatus::DryRun => counts.dry_run += 1,
            }
        }
        counts
    }

    /// Console summary printed after a run
    #[must_use]
    pub fn render_console(&self) -> String {
        let counts = self.counts();
        let mut out = String::new();
        let _ = writeln!(out, "Run directory: {}", self.run_dir.display());
        let _ = writeln!(
            out,
            "Passed: {} | Failed: {} | Blocked: {} | Dry-run: {}",
            counts.passed, counts.failed, counts.blocked, counts.dry_run
        );
        for result in &self.results {
            let _ = write!(out, "- {}: {}", result.id(), result.status());
            if !result.reasons().is_empty() {
                let _ = write!(out, " ({})", result.reasons().join("; "));
            }
            out.push('\n');
        }
        out
    }
}
