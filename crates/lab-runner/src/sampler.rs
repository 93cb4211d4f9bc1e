//! Status-channel sampling
//!
//! The pipeline publishes its counters through two channels: an IPC socket
//! answering `LATENCY` requests and a status file rewritten in place. The
//! sampler decides once per window which channel leads and polls at a fixed
//! interval until the window closes.

use async_trait::async_trait;
use lab_core::{
    parse_status_text, strip_acknowledgement, ExperimentPlan, MetricSample, MetricValue,
    MetricsSummary,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// A readable source of `key=value` status text
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Short channel name for logs
    fn name(&self) -> &'static str;

    /// Whether the channel exists right now
    fn is_available(&self) -> bool;

    /// Read the current status text; `None` when nothing could be read
    async fn fetch(&self) -> Option<String>;
}

/// Status file rewritten by the pipeline
#[derive(Debug, Clone)]
pub struct FileStatus {
    path: PathBuf,
}

impl FileStatus {
    /// Source reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StatusSource for FileStatus {
    fn name(&self) -> &'static str {
        "file"
    }

    fn is_available(&self) -> bool {
        self.path.exists()
    }

    async fn fetch(&self) -> Option<String> {
        tokio::fs::read_to_string(&self.path).await.ok()
    }
}

/// IPC socket of the pipeline
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct SocketStatus {
    path: PathBuf,
    timeout: Duration,
}

#[cfg(unix)]
impl SocketStatus {
    /// Request sent to the socket
    pub const REQUEST: &'static [u8] = b"LATENCY\n";

    /// Source querying `path` with a 3 s exchange timeout
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: Duration::from_secs(3),
        }
    }

    async fn exchange(&self) -> std::io::Result<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::UnixStream::connect(&self.path).await?;
        stream.write_all(Self::REQUEST).await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }
}

#[cfg(unix)]
#[async_trait]
impl StatusSource for SocketStatus {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn is_available(&self) -> bool {
        self.path.exists()
    }

    async fn fetch(&self) -> Option<String> {
        match tokio::time::timeout(self.timeout, self.exchange()).await {
            Ok(Ok(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                Some(strip_acknowledgement(&text).to_string())
            }
            Ok(Err(e)) => {
                debug!(path = %self.path.display(), error = %e, "status socket query failed");
                None
            }
            Err(_) => {
                debug!(path = %self.path.display(), "status socket query timed out");
                None
            }
        }
    }
}

/// Polls the status channels for a measurement window
#[derive(Clone)]
pub struct MetricSampler {
    primary: Option<Arc<dyn StatusSource>>,
    fallback: Arc<dyn StatusSource>,
}

impl MetricSampler {
    /// Sampler preferring `primary` (when it exists at window start) over `fallback`
    pub fn new(primary: Option<Arc<dyn StatusSource>>, fallback: Arc<dyn StatusSource>) -> Self {
        Self { primary, fallback }
    }

    /// Socket and status file configured in the plan
    #[must_use]
    pub fn for_plan(plan: &ExperimentPlan) -> Self {
        #[cfg(unix)]
        let primary: Option<Arc<dyn StatusSource>> =
            Some(Arc::new(SocketStatus::new(&plan.status_socket)));
        #[cfg(not(unix))]
        let primary: Option<Arc<dyn StatusSource>> = None;

        Self::new(primary, Arc::new(FileStatus::new(&plan.status_file)))
    }

    /// Sample for `duration`, polling every `poll`
    ///
    /// Not cancellable. A window in which nothing could be read yields an
    /// empty summary.
    pub async fn sample(&self, duration: Duration, poll: Duration) -> MetricsSummary {
        let primary = self.primary.as_ref().filter(|p| p.is_available());
        let channel = primary.map_or(self.fallback.name(), |p| p.name());
        info!(
            channel,
            window_s = duration.as_secs_f64(),
            poll_s = poll.as_secs_f64(),
            "sampling status"
        );

        let started = Instant::now();
        let mut samples = Vec::new();
        while started.elapsed() < duration {
            let mut values = match primary {
                Some(source) => read(source.as_ref()).await,
                None => None,
            };
            if values.is_none() {
                values = read(self.fallback.as_ref()).await;
            }
            if let Some(values) = values {
                samples.push(MetricSample::now(values));
            }
            tokio::time::sleep(poll).await;
        }

        let summary = MetricsSummary::from_samples(&samples);
        debug!(samples = summary.sample_count, "sampling window closed");
        summary
    }
}

async fn read(source: &dyn StatusSource) -> Option<BTreeMap<String, MetricValue>> {
    let text = source.fetch().await?;
    let values = parse_status_text(&text);
    (!values.is_empty()).then_some(values)
}
