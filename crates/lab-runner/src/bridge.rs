//! Device telemetry capture
//!
//! A log-streaming command (by default `adb logcat`) runs alongside a
//! measurement window. A background reader parses each line into a
//! [`DeviceSample`] and keeps the most recent ones in a bounded ring.

use crate::command::CommandExecutor;
use crate::error::LabError;
use crate::process::{stop_child, StopOutcome, StopSignal};
use lab_core::{parse_device_line, DeviceSample, DeviceSummary, DeviceTelemetryConfig, SampleRing};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Timeout for the log clear command
const CLEAR_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on waiting for the reader to drain after the capture stopped
const READER_DRAIN: Duration = Duration::from_secs(2);

/// Starts device captures
pub struct TelemetryBridge {
    config: DeviceTelemetryConfig,
    executor: Arc<dyn CommandExecutor>,
    cwd: PathBuf,
}

impl TelemetryBridge {
    /// Bridge running its commands in `cwd`
    pub fn new(
        config: DeviceTelemetryConfig,
        executor: Arc<dyn CommandExecutor>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            executor,
            cwd: cwd.into(),
        }
    }

    /// Clear stale device logs and start streaming
    ///
    /// The clear step is best effort. Failing to spawn the capture command is
    /// reported as [`LabError::Telemetry`].
    pub async fn start(&self) -> Result<BridgeSession, LabError> {
        let argv = self.config.command_argv()?;

        match self.config.clear_argv() {
            Ok(Some(clear)) => {
                let result = self.executor.run(&clear, &self.cwd, CLEAR_TIMEOUT).await;
                if !result.success() {
                    debug!(command = %result.command_line(), "device log clear failed");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "invalid device log clear command"),
        }

        let (program, args) = argv.split_first().ok_or_else(|| LabError::Telemetry {
            command: String::new(),
            message: "empty command".to_string(),
        })?;
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LabError::Telemetry {
                command: argv.join(" "),
                message: e.to_string(),
            })?;

        let ring = Arc::new(SampleRing::new(self.config.max_samples));
        let reader = match child.stdout.take() {
            Some(stdout) => {
                let ring = Arc::clone(&ring);
                Some(tokio::spawn(read_device_lines(BufReader::new(stdout), ring)))
            }
            None => None,
        };

        info!(command = %argv.join(" "), pid = ?child.id(), "device telemetry started");
        Ok(BridgeSession {
            child,
            ring,
            reader,
            grace: self.config.stop_grace(),
        })
    }
}

/// A running capture
pub struct BridgeSession {
    child: Child,
    ring: Arc<SampleRing<DeviceSample>>,
    reader: Option<JoinHandle<usize>>,
    grace: Duration,
}

impl BridgeSession {
    /// Samples buffered so far
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    /// Stop the capture and collect what it saw
    pub async fn stop(mut self) -> DeviceCapture {
        let outcome = stop_child(&mut self.child, StopSignal::Interrupt, self.grace).await;

        if let Some(mut reader) = self.reader.take() {
            match tokio::time::timeout(READER_DRAIN, &mut reader).await {
                Ok(Ok(lines)) => debug!(lines, "device reader finished"),
                Ok(Err(e)) => warn!(error = %e, "device reader failed"),
                Err(_) => {
                    reader.abort();
                    debug!("device reader aborted");
                }
            }
        }

        let dropped = self.ring.dropped();
        let samples = self.ring.drain();
        info!(samples = samples.len(), dropped, ?outcome, "device telemetry stopped");
        DeviceCapture {
            samples,
            dropped,
            outcome,
        }
    }
}

/// Everything one capture produced
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCapture {
    /// Retained samples, oldest first
    pub samples: Vec<DeviceSample>,
    /// Samples evicted from the ring
    pub dropped: u64,
    /// How the capture command ended
    pub outcome: StopOutcome,
}

impl DeviceCapture {
    /// Aggregate of the retained samples
    #[must_use]
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary::from_samples(&self.samples)
    }
}

/// Parse lines until EOF; returns the number of lines read
async fn read_device_lines<R>(reader: R, ring: Arc<SampleRing<DeviceSample>>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                if let Some(sample) = parse_device_line(&line) {
                    ring.push(sample);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "device stream read failed");
                break;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandExecutor;
    use lab_core::{CommandLine, CommandResult};

    const LINE: &str = "I/DaylightMirror( 1234): FPS: 59.8 | recv: 1.2ms | lz4: 0.8ms | \
                        delta: 0.3ms | neon: 0.5ms | vsync: 16.6ms | 120KB delta | drops: 0 | \
                        overwritten: 1 | total: 480";

    #[tokio::test]
    async fn reader_keeps_parsed_lines_only() {
        let text = format!("noise\n{LINE}\n--------- beginning of main\n{LINE}\n");
        let ring = Arc::new(SampleRing::new(8));
        let lines = read_device_lines(BufReader::new(text.as_bytes()), Arc::clone(&ring)).await;
        assert_eq!(lines, 4);
        assert_eq!(ring.len(), 2);
    }

    #[tokio::test]
    async fn reader_respects_ring_capacity() {
        let text = format!("{LINE}\n").repeat(5);
        let ring = Arc::new(SampleRing::new(2));
        read_device_lines(BufReader::new(text.as_bytes()), Arc::clone(&ring)).await;
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.dropped(), 3);
    }

    #[tokio::test]
    async fn missing_capture_program_is_telemetry_error() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_run().returning(|argv, _, _| CommandResult::dry_run(argv));
        let config = DeviceTelemetryConfig {
            enabled: true,
            command: CommandLine::from("definitely-not-adb-4242 logcat"),
            ..DeviceTelemetryConfig::default()
        };
        let bridge = TelemetryBridge::new(config, Arc::new(mock), "/");
        let err = bridge.start().await.err().unwrap();
        assert!(matches!(err, LabError::Telemetry { .. }));
        assert!(!err.is_run_fatal());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn capture_collects_streamed_samples() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_run().never();
        let script = format!("printf '%s\\n' '{LINE}' '{LINE}'; exec sleep 30");
        let config = DeviceTelemetryConfig {
            enabled: true,
            command: CommandLine::Argv(vec!["sh".to_string(), "-c".to_string(), script]),
            clear_command: None,
            stop_grace_s: 5.0,
            ..DeviceTelemetryConfig::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let session = TelemetryBridge::new(config, Arc::new(mock), dir.path())
            .start()
            .await
            .unwrap();

        for _ in 0..50 {
            if session.buffered() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let capture = session.stop().await;
        assert_eq!(capture.samples.len(), 2);
        assert_eq!(capture.dropped, 0);
        assert_eq!(capture.outcome, StopOutcome::Exited);

        let summary = capture.summary();
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.last.map(|c| c.total), Some(480));
    }
}
