//! Connector trait abstraction and per-port result types.
//!
//! The scheduler only ever talks to a [`Connector`], which lets tests swap
//! the real TCP connector for an instrumented one.

use crate::types::Port;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Outcome of one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Handshake completed; carries the banner if one was captured.
    Open {
        #[serde(skip_serializing_if = "Option::is_none")]
        banner: Option<String>,
    },
    /// Connection refused (RST received).
    Closed,
    /// No answer within the deadline, or the network said unreachable.
    Filtered,
    /// Any other socket-level fault.
    Error { message: String },
}

impl Outcome {
    /// An open port without a banner.
    pub const fn open() -> Self {
        Self::Open { banner: None }
    }

    /// Check if the port accepted the connection.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The captured banner, if any.
    pub fn banner(&self) -> Option<&str> {
        match self {
            Self::Open { banner } => banner.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { .. } => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Filtered => write!(f, "filtered"),
            Self::Error { .. } => write!(f, "error"),
        }
    }
}

/// Result of scanning a single port of a single host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Host as given by the user.
    pub host: String,
    /// The port that was attempted.
    pub port: Port,
    /// What the attempt found.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ScanResult {
    /// Create a new scan result.
    pub fn new(host: impl Into<String>, port: Port, outcome: Outcome) -> Self {
        Self {
            host: host.into(),
            port,
            outcome,
        }
    }

    /// Check if the port is open.
    pub fn is_open(&self) -> bool {
        self.outcome.is_open()
    }
}

/// Deadlines for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Hard deadline for the TCP handshake.
    pub connect: Duration,
    /// Deadline for the banner read; `None` skips the read.
    pub read: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(1000),
            read: Some(Duration::from_millis(1000)),
        }
    }
}

/// Performs a single bounded connection attempt.
///
/// Implementations must never panic and never block past
/// `timeouts.connect + timeouts.read`: every fault becomes an [`Outcome`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attempt `address:port` and report what was found.
    async fn connect(&self, address: IpAddr, port: Port, timeouts: Timeouts) -> Outcome;
}
