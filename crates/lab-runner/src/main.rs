//! `latency-lab`: run an experiment plan and record the outcomes

use anyhow::Context;
use clap::Parser;
use lab_core::{init_tracing, ExperimentPlan, LogFormat};
use lab_runner::{Orchestrator, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "latency-lab", version, about = "Run latency experiments and record results")]
struct Args {
    /// Experiment plan (JSON, YAML or TOML)
    #[arg(long)]
    plan: PathBuf,

    /// Resolve paths and write artifacts without executing anything
    #[arg(long)]
    dry_run: bool,

    /// Capture device telemetry during every measurement window
    #[arg(long)]
    device_telemetry: bool,

    /// Repository root (defaults to the current directory)
    #[arg(long)]
    repo_root: Option<PathBuf>,

    /// Log line format (text or json)
    #[arg(long, value_enum, ignore_case = true, default_value_t)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let repo_root = match args.repo_root {
        Some(root) => root,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let plan_path = if args.plan.is_absolute() {
        args.plan
    } else {
        repo_root.join(&args.plan)
    };

    let plan = ExperimentPlan::from_path(&plan_path)
        .with_context(|| format!("loading plan {}", plan_path.display()))?
        .resolve(&repo_root);

    let options = RunOptions::default()
        .with_dry_run(args.dry_run)
        .with_device_telemetry(args.device_telemetry);
    let report = Orchestrator::new(plan, &plan_path, &repo_root, options)
        .run()
        .await?;

    print!("{}", report.render_console());
    Ok(ExitCode::from(report.exit_code()))
}
