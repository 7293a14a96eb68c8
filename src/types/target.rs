//! Target specification types with CIDR and hostname support.
//!
//! Provides flexible target parsing supporting:
//! - Single IP addresses (IPv4 and IPv6)
//! - CIDR notation (192.168.1.0/24)
//! - Hostnames (example.com)
//!
//! Hostnames stay unresolved until the scheduler picks the host up, so a
//! DNS failure only ever affects that one host.

use super::PortSet;
use crate::error::ScanError;
use crate::scanner::Timeouts;
use ipnetwork::IpNetwork;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// One host to sweep, with everything needed to scan it.
///
/// Immutable once handed to the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct ScanTarget {
    /// Host as given by the user (IP literal or hostname).
    pub host: String,
    /// Ports to attempt, in dispatch order.
    pub ports: PortSet,
    /// Connect deadline per attempt.
    pub timeout: Duration,
    /// Banner read deadline; `None` disables banner grabbing.
    pub read_timeout: Option<Duration>,
    /// Maximum in-flight attempts against this host.
    pub concurrency: usize,
}

impl ScanTarget {
    /// Create a target with default timeouts and concurrency.
    pub fn new(host: impl Into<String>, ports: PortSet) -> Self {
        Self {
            host: host.into(),
            ports,
            timeout: Duration::from_millis(1000),
            read_timeout: Some(Duration::from_millis(1000)),
            concurrency: 64,
        }
    }

    /// Set the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set (or disable) the banner read timeout.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Set the per-host concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Deadlines handed to the connector.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: self.timeout,
            read: self.read_timeout,
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} ports)", self.host, self.ports.len())
    }
}

/// Error type for target parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target format: '{0}'")]
    InvalidFormat(String),
    #[error("invalid CIDR notation: '{0}'")]
    InvalidCidr(String),
    #[error("CIDR range too large: {0} addresses (max: {1})")]
    CidrTooLarge(u128, u128),
}

/// A target specification as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// A single IP address.
    Single(IpAddr),
    /// A CIDR network range.
    Cidr(IpNetwork),
    /// A hostname, resolved when its sweep starts.
    Hostname(String),
}

impl TargetSpec {
    /// Maximum number of hosts allowed in a CIDR range.
    pub const MAX_CIDR_HOSTS: u128 = 65536;

    /// Parse a target specification from a string.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Single(ip));
        }

        if s.contains('/') {
            let network: IpNetwork = s
                .parse()
                .map_err(|_| TargetError::InvalidCidr(s.to_string()))?;

            let host_count = network_size(&network);
            if host_count > Self::MAX_CIDR_HOSTS {
                return Err(TargetError::CidrTooLarge(host_count, Self::MAX_CIDR_HOSTS));
            }

            return Ok(Self::Cidr(network));
        }

        if is_valid_hostname(s) {
            return Ok(Self::Hostname(s.to_string()));
        }

        Err(TargetError::InvalidFormat(s.to_string()))
    }

    /// Expand into host strings. CIDR ranges yield every host address,
    /// skipping network and broadcast addresses of IPv4 ranges wider than /31.
    pub fn hosts(&self) -> Vec<String> {
        match self {
            Self::Single(ip) => vec![ip.to_string()],
            Self::Hostname(hostname) => vec![hostname.clone()],
            Self::Cidr(network) => network
                .iter()
                .filter(|ip| match (network, ip) {
                    (IpNetwork::V4(net), IpAddr::V4(addr)) if net.prefix() < 31 => {
                        *addr != net.network() && *addr != net.broadcast()
                    }
                    _ => true,
                })
                .map(|ip| ip.to_string())
                .collect(),
        }
    }
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ip) => write!(f, "{}", ip),
            Self::Cidr(network) => write!(f, "{}", network),
            Self::Hostname(hostname) => write!(f, "{}", hostname),
        }
    }
}

/// A DNS resolver shared by every host of a scan.
///
/// Built once from the system configuration so that its cache and
/// connection pool are reused across hosts. Clones share the same resolver.
#[derive(Clone)]
pub struct HostResolver {
    inner: TokioAsyncResolver,
}

impl HostResolver {
    /// Use the system resolver configuration, falling back to the library
    /// defaults when it cannot be read.
    pub fn from_system_conf() -> Self {
        let inner = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            debug!(error = %e, "system resolver configuration unavailable, using defaults");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { inner }
    }

    /// Resolve a host string to all of its addresses.
    ///
    /// IP literals are returned as-is without touching DNS.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ScanError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let response = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| ScanError::HostUnresolvable {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let addresses: Vec<IpAddr> = response.iter().collect();
        if addresses.is_empty() {
            return Err(ScanError::HostUnresolvable {
                host: host.to_string(),
                reason: "no addresses found".to_string(),
            });
        }
        Ok(addresses)
    }
}

impl fmt::Debug for HostResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostResolver").finish_non_exhaustive()
    }
}

/// Resolve a single host with a one-off resolver.
///
/// Scans share a [`HostResolver`] instead.
pub async fn resolve_host(host: &str) -> Result<Vec<IpAddr>, ScanError> {
    HostResolver::from_system_conf().resolve(host).await
}

fn network_size(network: &IpNetwork) -> u128 {
    match network {
        IpNetwork::V4(net) => u128::from(net.size()),
        IpNetwork::V6(net) => {
            let prefix = u32::from(net.prefix());
            if prefix == 0 {
                u128::MAX
            } else {
                1u128 << (128 - prefix)
            }
        }
    }
}

/// Check if a string is a valid hostname.
fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }

    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.starts_with(|c: char| c.is_ascii_alphanumeric())
            && label.ends_with(|c: char| c.is_ascii_alphanumeric())
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
