//! # slyscan - A Concurrent TCP Port Scanner
//!
//! slyscan sweeps hosts for open TCP ports using plain connect attempts,
//! bounded by a global and a per-host concurrency limit.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: Global and per-host slot pools, plus an optional rate limit
//! - **Flexible Targeting**: Single IPs, hostnames, and CIDR ranges
//! - **Banner Grabbing**: Reads the greeting a service sends on connect
//! - **Reachability Precheck**: Skips dead hosts before large sweeps
//! - **Cooperative Cancellation**: Ctrl-C keeps the results gathered so far
//! - **Multiple Output Formats**: Plain text, JSON, and CSV
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use slyscan::scanner::{run_scan, ScanRequest, ScanScheduler, SchedulerConfig, TcpConnector};
//! use slyscan::types::PortSet;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), slyscan::ScanError> {
//!     let ports = PortSet::resolve(["22", "80,443", "8000-8100"])?;
//!     let request = ScanRequest::new(["192.168.1.1"], ports);
//!     let scheduler = ScanScheduler::new(Arc::new(TcpConnector::new()), SchedulerConfig::default());
//!
//!     let report = run_scan(scheduler, &request).await?;
//!     for host in &report.hosts {
//!         println!("{}: {:?}", host.host, host.open_port_numbers());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Ports, port sets, and scan targets
//! - [`scanner`] - Connectors, the scheduler, and result aggregation
//! - [`progress`] - Live per-host progress bars
//! - [`config`] - Settings file discovery and defaults
//! - [`error`] - Error types
//! - [`output`] - Output formatting utilities

pub mod banner;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, ConfigError, ScanError};
pub use scanner::{
    run_scan, Connector, HostOutcome, Outcome, ScanEvent, ScanReport, ScanRequest, ScanResult,
    ScanScheduler,
};
pub use types::{Port, PortSet, ScanTarget, TargetSpec};
