//! Cheap reachability probe run before a large sweep.
//!
//! A host that answers on none of a handful of well-known ports is skipped.
//! This is advisory: a host listening only on an unlisted port is missed.

use crate::types::{resolve_host, Port};
use futures::stream::{self, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Ports probed by default.
pub const DEFAULT_PRECHECK_PORTS: [u16; 12] =
    [21, 22, 23, 25, 53, 80, 135, 139, 443, 445, 3389, 8080];

/// Port sets smaller than this are scanned without a precheck.
pub const DEFAULT_MIN_PORTS: usize = 1024;

/// Reachability probe against a small, fixed port list.
#[derive(Debug, Clone)]
pub struct HostPrecheck {
    ports: Vec<Port>,
    timeout: Duration,
    min_ports: usize,
}

impl Default for HostPrecheck {
    fn default() -> Self {
        Self::new(
            DEFAULT_PRECHECK_PORTS.iter().copied().filter_map(Port::new).collect(),
            Duration::from_millis(1000),
        )
    }
}

impl HostPrecheck {
    /// Create a precheck probing `ports` with a per-connect `timeout`.
    pub fn new(ports: Vec<Port>, timeout: Duration) -> Self {
        Self {
            ports,
            timeout,
            min_ports: DEFAULT_MIN_PORTS,
        }
    }

    /// Only precheck hosts whose sweep covers at least `min_ports` ports.
    pub fn with_min_ports(mut self, min_ports: usize) -> Self {
        self.min_ports = min_ports;
        self
    }

    /// Whether a sweep of `port_count` ports is worth prechecking.
    pub fn applies_to(&self, port_count: usize) -> bool {
        port_count >= self.min_ports
    }

    /// The probed ports.
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Resolve `host` and probe it. Unresolvable hosts are unreachable.
    pub async fn is_reachable(&self, host: &str) -> bool {
        match resolve_host(host).await {
            Ok(addresses) => self.probe(&addresses).await.is_some(),
            Err(e) => {
                debug!(host, error = %e, "precheck could not resolve host");
                false
            }
        }
    }

    /// Number of handshakes a probe of `addresses` attempts.
    pub fn attempt_count(&self, addresses: &[IpAddr]) -> usize {
        addresses.len() * self.ports.len()
    }

    /// Probe every (address, port) pair at once and return the first
    /// address that completed a handshake.
    pub async fn probe(&self, addresses: &[IpAddr]) -> Option<IpAddr> {
        self.probe_bounded(addresses, usize::MAX).await
    }

    /// Like [`probe`](Self::probe), with at most `limit` handshakes in flight.
    pub async fn probe_bounded(&self, addresses: &[IpAddr], limit: usize) -> Option<IpAddr> {
        let targets: Vec<SocketAddr> = addresses
            .iter()
            .flat_map(|&ip| {
                self.ports
                    .iter()
                    .map(move |port| SocketAddr::new(ip, port.as_u16()))
            })
            .collect();
        let mut attempts = stream::iter(targets)
            .map(|addr| async move {
                let answered = matches!(
                    timeout(self.timeout, TcpStream::connect(addr)).await,
                    Ok(Ok(_))
                );
                trace!(%addr, answered, "precheck connect");
                (addr, answered)
            })
            .buffer_unordered(limit.max(1));

        while let Some((addr, answered)) = attempts.next().await {
            if answered {
                return Some(addr.ip());
            }
        }
        None
    }
}
