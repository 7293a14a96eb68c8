//! Scan command implementation.

use crate::cli::OutputFormat;
use crate::config::AppSettings;
use crate::error::{CliError, CliResult};
use crate::output;
use crate::progress::{ProgressReporter, ProgressSender, PROGRESS_BUFFER};
use indicatif::MultiProgress;
use crate::scanner::{run_scan, RateLimiter, ScanRequest, ScanScheduler, TcpConnector};
use crate::types::{Port, PortSet, TargetSpec};
use clap::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Scan hosts for open TCP ports.
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// Hosts to scan (IP, hostname, or CIDR notation)
    ///
    /// Examples:
    ///   192.168.1.1        Single IP address
    ///   example.com        Hostname
    ///   192.168.1.0/24     CIDR range
    #[arg(value_name = "HOSTS", required = true)]
    pub hosts: Vec<String>,

    /// Ports to scan (e.g. "80", "22,80,443", "1-1024", "top", "all"); may be repeated
    #[arg(short, long = "ports", value_name = "PORTS", required = true)]
    pub ports: Vec<String>,

    /// Connect timeout in milliseconds
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Banner read timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub read_timeout: Option<u64>,

    /// Don't read service banners
    #[arg(long)]
    pub no_banner: bool,

    /// Maximum in-flight connection attempts across all hosts
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Maximum in-flight connection attempts per host
    #[arg(long)]
    pub host_concurrency: Option<usize>,

    /// Maximum hosts scanned at the same time
    #[arg(long)]
    pub parallel_hosts: Option<usize>,

    /// Connection attempts per second (0 = unlimited)
    #[arg(short = 'r', long = "rate")]
    pub rate: Option<u32>,

    /// Skip the reachability check before large sweeps
    #[arg(long)]
    pub no_precheck: bool,

    /// Ports probed by the reachability check
    #[arg(long, value_name = "PORTS")]
    pub precheck_ports: Option<String>,

    /// Output format for results
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,
}

impl ScanCommand {
    /// Fold the command-line overrides into `settings` and validate the result.
    pub fn apply(&self, mut settings: AppSettings) -> CliResult<AppSettings> {
        if let Some(timeout) = self.timeout {
            settings.timeout_ms = timeout;
        }
        if let Some(read_timeout) = self.read_timeout {
            settings.read_timeout_ms = read_timeout;
        }
        if self.no_banner {
            settings.banner = false;
        }
        if let Some(concurrency) = self.concurrency {
            settings.global_concurrency = concurrency;
        }
        if let Some(concurrency) = self.host_concurrency {
            settings.host_concurrency = concurrency;
        }
        if let Some(hosts) = self.parallel_hosts {
            settings.parallel_hosts = hosts;
        }
        if let Some(rate) = self.rate {
            settings.rate_limit = rate;
        }
        if self.no_precheck {
            settings.precheck.enabled = false;
        }
        if let Some(ports) = &self.precheck_ports {
            let ports: PortSet = ports.parse()?;
            settings.precheck.ports = ports.iter().map(Port::as_u16).collect();
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Build the scan request from the positional hosts and `--ports`.
    pub fn request(&self, settings: &AppSettings) -> CliResult<ScanRequest> {
        let ports = PortSet::resolve(&self.ports)?;

        let mut hosts = Vec::new();
        for host in &self.hosts {
            hosts.extend(TargetSpec::parse(host)?.hosts());
        }
        if hosts.is_empty() {
            return Err(CliError::Other("no hosts to scan".to_string()));
        }

        Ok(ScanRequest::new(hosts, ports)
            .with_timeout(settings.timeout())
            .with_read_timeout(settings.read_timeout())
            .with_host_concurrency(settings.host_concurrency))
    }

    /// Execute the scan command.
    ///
    /// Progress bars are drawn on `multi`, which should be the surface the
    /// log writer suspends. Returns `true` when the scan was interrupted by
    /// Ctrl-C. The partial report has been printed by then.
    pub async fn execute(
        &self,
        settings: AppSettings,
        quiet: bool,
        multi: MultiProgress,
    ) -> CliResult<bool> {
        let settings = self.apply(settings)?;
        let request = self.request(&settings)?;

        let plain = self.output == OutputFormat::Plain;
        if plain && !quiet {
            output::print_scan_header(request.hosts().len(), request.ports().len());
        }

        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping dispatch");
                    cancel.cancel();
                }
            }
        });

        let (progress, progress_rx) = ProgressSender::channel(PROGRESS_BUFFER);
        let reporter = ProgressReporter::new(multi).spawn(progress_rx);

        let mut scheduler = ScanScheduler::new(Arc::new(TcpConnector::new()), settings.scheduler_config())
            .with_progress(progress)
            .with_cancellation(cancel.clone());
        if let Some(precheck) = settings.host_precheck() {
            scheduler = scheduler.with_precheck(precheck);
        }
        if let Some(limiter) = RateLimiter::per_second(settings.rate_limit) {
            info!(rate = settings.rate_limit, "rate limiting enabled");
            scheduler = scheduler.with_rate_limiter(limiter);
        }

        let report = run_scan(scheduler, &request).await;
        interrupt.abort();
        if let Err(e) = reporter.await {
            warn!(error = %e, "progress reporter failed");
        }
        let report = report?;

        output::print_report(&report, self.output)?;
        Ok(cancel.is_cancelled())
    }
}
