//! Experiment plans
//!
//! A plan is the whole configuration of an invocation: the ordered
//! experiment list plus global settings. It is read from JSON, YAML or TOML
//! (picked by file extension) and every omitted setting takes its default.

use crate::error::PlanError;
use crate::gate::GateConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default status file written by the pipeline
pub const DEFAULT_STATUS_FILE: &str = "/tmp/daylight-mirror.status";
/// Default IPC socket of the pipeline
pub const DEFAULT_STATUS_SOCKET: &str = "/tmp/daylight-mirror.sock";
/// Default results directory, relative to the repo root
pub const DEFAULT_RESULTS_DIR: &str = "experiments/results";

/// Serialization format of a plan document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    /// `.json` and anything unrecognised
    Json,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl PlanFormat {
    /// Pick the format from a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// A command given either as an argv list or as one shell-like string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// Pre-split arguments
    Argv(Vec<String>),
    /// String split with POSIX shell quoting rules (no expansion)
    Shell(String),
}

impl CommandLine {
    /// Split into arguments; `None` for unbalanced quotes or an empty command
    #[must_use]
    pub fn to_argv(&self) -> Option<Vec<String>> {
        let argv = match self {
            Self::Argv(args) => args.clone(),
            Self::Shell(line) => shlex::split(line)?,
        };
        (!argv.is_empty()).then_some(argv)
    }

    fn describe(&self) -> String {
        match self {
            Self::Argv(args) => args.join(" "),
            Self::Shell(line) => line.clone(),
        }
    }

    fn argv_in(&self, context: impl Into<String>) -> Result<Vec<String>, PlanError> {
        self.to_argv()
            .ok_or_else(|| PlanError::invalid_command(context, self.describe()))
    }
}

impl From<&[&str]> for CommandLine {
    fn from(args: &[&str]) -> Self {
        Self::Argv(args.iter().map(|a| (*a).to_string()).collect())
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        Self::Shell(line.to_string())
    }
}

/// One experiment of the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    /// Unique id within the plan
    pub id: String,
    /// Branch for the worktree, overriding the template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Setup commands, run in order inside the working directory
    #[serde(default)]
    pub commands: Vec<CommandLine>,
    /// Warmup override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmup_s: Option<f64>,
    /// Measurement window override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_s: Option<f64>,
    /// Free-form notes copied into the result
    #[serde(default)]
    pub notes: String,
}

impl ExperimentSpec {
    /// Create an experiment with no commands
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            branch: None,
            commands: Vec::new(),
            warmup_s: None,
            measure_s: None,
            notes: String::new(),
        }
    }

    /// Add a setup command
    #[must_use]
    pub fn with_command(mut self, command: impl Into<CommandLine>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// Set warmup and measurement overrides
    #[must_use]
    pub fn with_timing(mut self, warmup_s: f64, measure_s: f64) -> Self {
        self.warmup_s = Some(warmup_s);
        self.measure_s = Some(measure_s);
        self
    }

    /// Setup commands as argv lists
    pub fn command_argvs(&self) -> Result<Vec<Vec<String>>, PlanError> {
        self.commands
            .iter()
            .enumerate()
            .map(|(i, c)| c.argv_in(format!("{}.commands[{i}]", self.id)))
            .collect()
    }
}

/// Isolated working copies per experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Run experiments in `git worktree` checkouts instead of the repo root
    #[serde(alias = "use_worktrees")]
    pub enabled: bool,
    /// Branch name template; `{id}` is replaced with the experiment id
    pub branch_template: String,
    /// Ref new branches start from
    pub base_ref: String,
    /// Directory holding the worktrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_root: Option<PathBuf>,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            branch_template: "exp/{id}".to_string(),
            base_ref: "main".to_string(),
            worktree_root: None,
        }
    }
}

impl WorktreeConfig {
    /// Directory holding the worktrees; defaults to `<repo>-lab` next to the repo
    #[must_use]
    pub fn root_for(&self, repo_root: &Path) -> PathBuf {
        if let Some(root) = &self.worktree_root {
            return absolutize(&expand_home(root), repo_root);
        }
        let name = repo_root
            .file_name()
            .map_or_else(|| "repo".into(), |n| n.to_string_lossy().into_owned());
        repo_root
            .parent()
            .unwrap_or(repo_root)
            .join(format!("{name}-lab"))
    }

    /// Branch for an experiment
    #[must_use]
    pub fn branch_for(&self, spec: &ExperimentSpec) -> String {
        spec.branch
            .clone()
            .unwrap_or_else(|| self.branch_template.replace("{id}", &spec.id))
    }
}

/// How the pipeline daemon is managed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonMode {
    /// Started by hand before the run
    #[default]
    Manual,
    /// Started and stopped by the overseer
    Spawn,
    /// Each experiment's setup commands handle it
    Experiment,
}

/// Daemon lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Lifecycle mode
    pub mode: DaemonMode,
    /// Start command (spawn mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<CommandLine>,
    /// Stop command run at teardown (spawn mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<CommandLine>,
    /// Grace period after spawning
    pub startup_wait_s: f64,
    /// Timeout for the stop command
    pub stop_timeout_s: f64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            mode: DaemonMode::Manual,
            start: None,
            stop: None,
            startup_wait_s: 5.0,
            stop_timeout_s: 60.0,
        }
    }
}

impl DaemonConfig {
    /// Start command as argv
    pub fn start_argv(&self) -> Result<Option<Vec<String>>, PlanError> {
        self.start
            .as_ref()
            .map(|c| c.argv_in("daemon.start"))
            .transpose()
    }

    /// Stop command as argv
    pub fn stop_argv(&self) -> Result<Option<Vec<String>>, PlanError> {
        self.stop
            .as_ref()
            .map(|c| c.argv_in("daemon.stop"))
            .transpose()
    }

    /// Startup grace period
    #[must_use]
    pub fn startup_wait(&self) -> Duration {
        secs(self.startup_wait_s)
    }

    /// Stop command timeout
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        secs(self.stop_timeout_s)
    }
}

/// Device-side capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceTelemetryConfig {
    /// Capture for every experiment without the command-line flag
    pub enabled: bool,
    /// Long-running capture command
    pub command: CommandLine,
    /// Best-effort command run before each capture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_command: Option<CommandLine>,
    /// Wait after interrupting the capture before killing it
    pub stop_grace_s: f64,
    /// Ring buffer capacity
    pub max_samples: usize,
}

impl Default for DeviceTelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: CommandLine::from(&["adb", "logcat", "-s", "DaylightMirror:I"][..]),
            clear_command: Some(CommandLine::from(&["adb", "logcat", "-c"][..])),
            stop_grace_s: 5.0,
            max_samples: 4096,
        }
    }
}

impl DeviceTelemetryConfig {
    /// Capture command as argv
    pub fn command_argv(&self) -> Result<Vec<String>, PlanError> {
        self.command.argv_in("device_telemetry.command")
    }

    /// Clear command as argv
    pub fn clear_argv(&self) -> Result<Option<Vec<String>>, PlanError> {
        self.clear_command
            .as_ref()
            .map(|c| c.argv_in("device_telemetry.clear_command"))
            .transpose()
    }

    /// Interrupt grace period
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        secs(self.stop_grace_s)
    }
}

/// Ordered experiment list plus global settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentPlan {
    /// Experiments, run in declaration order
    pub experiments: Vec<ExperimentSpec>,
    /// Status file of the pipeline
    pub status_file: PathBuf,
    /// IPC socket of the pipeline
    pub status_socket: PathBuf,
    /// Seconds between status polls
    pub poll_interval_s: f64,
    /// Warmup before measuring
    pub default_warmup_s: f64,
    /// Measurement window
    pub default_measure_s: f64,
    /// Timeout for each setup command
    pub command_timeout_s: f64,
    /// Quality gates
    pub gates: GateConfig,
    /// Worktree isolation
    #[serde(alias = "git")]
    pub worktree: WorktreeConfig,
    /// Daemon lifecycle
    pub daemon: DaemonConfig,
    /// Device telemetry bridge
    pub device_telemetry: DeviceTelemetryConfig,
    /// Where run directories and the ledger live
    pub results_dir: PathBuf,
    /// Experiment whose metrics become the baseline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_id: Option<String>,
}

impl Default for ExperimentPlan {
    fn default() -> Self {
        Self {
            experiments: Vec::new(),
            status_file: PathBuf::from(DEFAULT_STATUS_FILE),
            status_socket: PathBuf::from(DEFAULT_STATUS_SOCKET),
            poll_interval_s: 2.0,
            default_warmup_s: 8.0,
            default_measure_s: 25.0,
            command_timeout_s: 300.0,
            gates: GateConfig::default(),
            worktree: WorktreeConfig::default(),
            daemon: DaemonConfig::default(),
            device_telemetry: DeviceTelemetryConfig::default(),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            baseline_id: None,
        }
    }
}

impl ExperimentPlan {
    /// Read, parse and validate a plan file
    pub fn from_path(path: &Path) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let plan = Self::parse(&text, PlanFormat::from_path(path), path)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Parse a plan document without validating it
    pub fn parse(text: &str, format: PlanFormat, origin: &Path) -> Result<Self, PlanError> {
        match format {
            PlanFormat::Json => serde_json::from_str(text).map_err(|e| PlanError::parse(origin, e)),
            PlanFormat::Yaml => serde_yaml::from_str(text).map_err(|e| PlanError::parse(origin, e)),
            PlanFormat::Toml => toml::from_str(text).map_err(|e| PlanError::parse(origin, e)),
        }
    }

    /// Check structural constraints
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.experiments.is_empty() {
            return Err(PlanError::NoExperiments);
        }

        let mut seen = HashSet::new();
        for (index, spec) in self.experiments.iter().enumerate() {
            if spec.id.trim().is_empty() {
                return Err(PlanError::EmptyExperimentId(index));
            }
            if !is_single_component(&spec.id) {
                return Err(PlanError::UnsafeExperimentId(spec.id.clone()));
            }
            if !seen.insert(spec.id.as_str()) {
                return Err(PlanError::DuplicateExperiment(spec.id.clone()));
            }
            spec.command_argvs()?;
            if let Some(v) = spec.warmup_s {
                check_duration(&format!("{}.warmup_s", spec.id), v)?;
            }
            if let Some(v) = spec.measure_s {
                check_duration(&format!("{}.measure_s", spec.id), v)?;
            }
        }

        if !(self.poll_interval_s.is_finite() && self.poll_interval_s > 0.0) {
            return Err(PlanError::InvalidDuration {
                field: "poll_interval_s".to_string(),
                value: self.poll_interval_s,
            });
        }
        check_duration("default_warmup_s", self.default_warmup_s)?;
        check_duration("default_measure_s", self.default_measure_s)?;
        check_duration("command_timeout_s", self.command_timeout_s)?;
        check_duration("daemon.startup_wait_s", self.daemon.startup_wait_s)?;
        check_duration("daemon.stop_timeout_s", self.daemon.stop_timeout_s)?;
        check_duration("device_telemetry.stop_grace_s", self.device_telemetry.stop_grace_s)?;

        if self.daemon.mode == DaemonMode::Spawn && self.daemon.start.is_none() {
            return Err(PlanError::MissingDaemonStart);
        }
        self.daemon.start_argv()?;
        self.daemon.stop_argv()?;
        self.device_telemetry.command_argv()?;
        self.device_telemetry.clear_argv()?;

        if let Some(baseline) = &self.baseline_id {
            if !seen.contains(baseline.as_str()) {
                warn!(baseline = %baseline, "baseline id does not match any experiment");
            }
        }
        Ok(())
    }

    /// Make relative paths absolute against the repo root
    #[must_use]
    pub fn resolve(mut self, repo_root: &Path) -> Self {
        self.results_dir = absolutize(&expand_home(&self.results_dir), repo_root);
        self.status_file = expand_home(&self.status_file);
        self.status_socket = expand_home(&self.status_socket);
        self.worktree.worktree_root = Some(self.worktree.root_for(repo_root));
        self
    }

    /// Ledger location
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.results_dir.join("ledger.jsonl")
    }

    /// Poll interval
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_s)
    }

    /// Warmup for one experiment
    #[must_use]
    pub fn warmup_for(&self, spec: &ExperimentSpec) -> Duration {
        secs(spec.warmup_s.unwrap_or(self.default_warmup_s))
    }

    /// Measurement window for one experiment
    #[must_use]
    pub fn measure_for(&self, spec: &ExperimentSpec) -> Duration {
        secs(spec.measure_s.unwrap_or(self.default_measure_s))
    }

    /// Setup command timeout
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        secs(self.command_timeout_s)
    }
}

fn check_duration(field: &str, value: f64) -> Result<(), PlanError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PlanError::InvalidDuration {
            field: field.to_string(),
            value,
        })
    }
}

/// Ids become file and directory names under the results and worktree roots
fn is_single_component(id: &str) -> bool {
    if id.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
