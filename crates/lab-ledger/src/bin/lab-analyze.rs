//! `lab-analyze`: rank recorded experiments and propose the next ones

use anyhow::Context;
use clap::Parser;
use lab_core::{init_tracing, LogFormat};
use lab_ledger::{AnalysisReport, Ledger, DEFAULT_LEDGER_PATH};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "lab-analyze", version, about = "Analyze the latency lab experiment ledger")]
struct Args {
    /// Path to ledger.jsonl
    #[arg(long, default_value = DEFAULT_LEDGER_PATH)]
    ledger: PathBuf,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Log line format (text or json)
    #[arg(long, value_enum, ignore_case = true, default_value_t)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let ledger = Ledger::new(&args.ledger);
    let history = ledger
        .load()
        .with_context(|| format!("reading {}", args.ledger.display()))?;

    if history.is_empty() {
        eprintln!("No entries in {}", args.ledger.display());
        return Ok(ExitCode::FAILURE);
    }

    let report = AnalysisReport::from_history(&history);
    if args.json {
        println!("{}", report.render_json()?);
    } else {
        print!("{}", report.render_text(ledger.path()));
    }
    Ok(ExitCode::SUCCESS)
}
