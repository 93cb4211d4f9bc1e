//! Graceful stop of long-running children
//!
//! A child is asked to stop with a signal, given a bounded grace period, and
//! killed if it is still alive afterwards. Signals are delivered with the
//! system `kill` utility.

use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Bound on waiting for a killed child to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(3);

/// Signal used to ask a child to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGINT, as from Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl StopSignal {
    fn flag(self) -> &'static str {
        match self {
            Self::Interrupt => "-INT",
            Self::Terminate => "-TERM",
        }
    }
}

/// How a child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Had exited before the stop request
    AlreadyExited,
    /// Exited within the grace period
    Exited,
    /// Had to be killed
    Killed,
    /// Could not be confirmed dead
    Unknown,
}

/// Deliver `signal` to `pid`; false when delivery failed
pub async fn send_signal(pid: u32, signal: StopSignal) -> bool {
    let status = Command::new("kill")
        .arg(signal.flag())
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) => status.success(),
        Err(e) => {
            debug!(pid, error = %e, "signal delivery unavailable");
            false
        }
    }
}

/// Signal, wait up to `grace`, then kill
pub async fn stop_child(child: &mut Child, signal: StopSignal, grace: Duration) -> StopOutcome {
    if let Ok(Some(_)) = child.try_wait() {
        return StopOutcome::AlreadyExited;
    }

    let delivered = match child.id() {
        Some(pid) => send_signal(pid, signal).await,
        None => false,
    };

    if delivered {
        if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
            debug!(?status, "child exited after stop signal");
            return StopOutcome::Exited;
        }
        warn!(grace_s = grace.as_secs_f64(), "child ignored stop signal; killing");
    }

    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to kill child");
    }
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(_)) => StopOutcome::Killed,
        _ => StopOutcome::Unknown,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spawn(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn interrupt_stops_cooperative_child() {
        let mut child = spawn("exec sleep 30");
        let outcome = stop_child(&mut child, StopSignal::Interrupt, Duration::from_secs(5)).await;
        assert_eq!(outcome, StopOutcome::Exited);
    }

    #[tokio::test]
    async fn stubborn_child_is_killed() {
        let mut child = spawn("trap '' INT; while true; do sleep 0.1; done");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let outcome =
            stop_child(&mut child, StopSignal::Interrupt, Duration::from_millis(300)).await;
        assert_eq!(outcome, StopOutcome::Killed);
    }

    #[tokio::test]
    async fn exited_child_is_left_alone() {
        let mut child = spawn("exit 0");
        let _ = child.wait().await;
        let outcome = stop_child(&mut child, StopSignal::Terminate, Duration::from_secs(1)).await;
        assert_eq!(outcome, StopOutcome::AlreadyExited);
    }
}
