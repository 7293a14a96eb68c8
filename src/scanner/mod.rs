//! Scan engine: connectors, scheduling, and result aggregation.
//!
//! A [`ScanRequest`] becomes one [`ScanTarget`] per host. The
//! [`ScanScheduler`] sweeps them concurrently and streams [`ScanEvent`]s,
//! which [`run_scan`] folds into a [`ScanReport`].

pub mod aggregator;
pub mod precheck;
pub mod rate_limiter;
pub mod scheduler;
pub mod tcp;
pub mod traits;

pub use aggregator::{HostOutcome, HostState, ResultAggregator};
pub use precheck::HostPrecheck;
pub use rate_limiter::RateLimiter;
pub use scheduler::{ScanEvent, ScanScheduler, ScanStream, SchedulerConfig, SkipReason};
pub use tcp::TcpConnector;
pub use traits::{Connector, Outcome, ScanResult, Timeouts};

use crate::error::ScanError;
use crate::types::{PortSet, ScanTarget};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What to scan: the same ports on every host.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    hosts: Vec<String>,
    ports: PortSet,
    timeout: Duration,
    read_timeout: Option<Duration>,
    host_concurrency: usize,
}

impl ScanRequest {
    /// Create a request. Duplicate hosts are dropped, keeping the first.
    pub fn new<I, S>(hosts: I, ports: PortSet) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let hosts = hosts
            .into_iter()
            .map(Into::into)
            .filter(|host: &String| seen.insert(host.clone()))
            .collect();

        Self {
            hosts,
            ports,
            timeout: Duration::from_millis(1000),
            read_timeout: Some(Duration::from_millis(1000)),
            host_concurrency: 64,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `None` disables banner grabbing.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_host_concurrency(mut self, concurrency: usize) -> Self {
        self.host_concurrency = concurrency;
        self
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    /// One target per host, in request order.
    pub fn targets(&self) -> Vec<ScanTarget> {
        self.hosts
            .iter()
            .map(|host| {
                ScanTarget::new(host.clone(), self.ports.clone())
                    .with_timeout(self.timeout)
                    .with_read_timeout(self.read_timeout)
                    .with_concurrency(self.host_concurrency)
            })
            .collect()
    }
}

/// Everything a finished (or interrupted) scan produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Set when the scan was interrupted before every host finished.
    pub cancelled: bool,
    pub hosts: Vec<HostOutcome>,
}

impl ScanReport {
    /// Total open ports across all hosts.
    pub fn open_count(&self) -> usize {
        self.hosts.iter().map(|h| h.open_ports.len()).sum()
    }
}

/// Run `request` on `scheduler` and collect the report.
///
/// Cancelling the scheduler's token still yields a report; hosts that
/// were cut short are marked partial.
pub async fn run_scan(scheduler: ScanScheduler, request: &ScanRequest) -> Result<ScanReport, ScanError> {
    let started_at = Utc::now();
    let start = Instant::now();
    let cancel = scheduler.cancellation_token();

    info!(
        hosts = request.hosts().len(),
        ports = request.ports().len(),
        "scan starting"
    );

    let mut stream = scheduler.scan(request.targets())?;
    let mut aggregator = ResultAggregator::new();
    while let Some(event) = stream.next().await {
        if let Some(outcome) = aggregator.record(event) {
            debug!(
                host = %outcome.host,
                state = ?outcome.state,
                open = outcome.open_ports.len(),
                "host finalized"
            );
        }
    }
    stream.join().await?;

    let hosts = aggregator.finish();
    let cancelled = cancel.is_cancelled() || hosts.iter().any(HostOutcome::is_partial);
    let duration_ms = start.elapsed().as_millis() as u64;
    info!(duration_ms, cancelled, "scan finished");

    Ok(ScanReport {
        started_at,
        duration_ms,
        cancelled,
        hosts,
    })
}
