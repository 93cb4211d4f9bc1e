//! Scripted collaborators for driving the orchestrator without processes

#![allow(dead_code)]

use async_trait::async_trait;
use lab_core::CommandResult;
use lab_runner::{CommandExecutor, MetricSampler, StatusSource};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Executor that records every call and answers from a table keyed by program
#[derive(Default)]
pub struct ScriptedExecutor {
    failures: HashMap<String, (i32, String)>,
    calls: Mutex<Vec<(Vec<String>, PathBuf)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation of `program` exit with `code` and `stderr`
    pub fn failing(mut self, program: &str, code: i32, stderr: &str) -> Self {
        self.failures
            .insert(program.to_string(), (code, stderr.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(Vec<String>, PathBuf)> {
        self.calls.lock().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(argv, _)| argv.join(" ")).collect()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, argv: &[String], cwd: &Path, _timeout: Duration) -> CommandResult {
        self.calls.lock().push((argv.to_vec(), cwd.to_path_buf()));
        let mut result = CommandResult::dry_run(argv);
        if let Some((code, stderr)) = argv.first().and_then(|p| self.failures.get(p)) {
            result.exit_code = Some(*code);
            result.stderr.clone_from(stderr);
        }
        result
    }
}

/// Status channel replaying canned responses, repeating the last one
pub struct FakeStatus {
    available: bool,
    responses: Mutex<VecDeque<Option<String>>>,
    fetches: AtomicUsize,
}

impl FakeStatus {
    pub fn new(responses: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            responses: Mutex::new(
                responses
                    .iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Always answers `text`
    pub fn constant(text: &str) -> Arc<Self> {
        Self::new(&[Some(text)])
    }

    /// Never answers
    pub fn silent() -> Arc<Self> {
        Self::new(&[None])
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Sampler reading only from this fake
    pub fn sampler(self: &Arc<Self>) -> MetricSampler {
        MetricSampler::new(None, Arc::clone(self) as Arc<dyn StatusSource>)
    }
}

#[async_trait]
impl StatusSource for FakeStatus {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn fetch(&self) -> Option<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock();
        if responses.len() > 1 {
            responses.pop_front().flatten()
        } else {
            responses.front().cloned().flatten()
        }
    }
}
