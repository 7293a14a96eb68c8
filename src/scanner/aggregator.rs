//! Groups scan events into per-host outcomes.

use super::scheduler::{ScanEvent, SkipReason};
use super::traits::{Outcome, ScanResult};
use crate::types::Port;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;

/// How a host's sweep ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HostState {
    /// Every port was attempted.
    Complete,
    /// Cancelled before or during the sweep.
    Partial,
    /// The precheck got no answer.
    Unreachable,
    /// Name resolution failed.
    Unresolvable(String),
}

/// The finalized result of scanning one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostOutcome {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
    /// False when the host was skipped; no ports were attempted then.
    pub reachable: bool,
    #[serde(flatten)]
    pub state: HostState,
    pub ports_total: usize,
    pub ports_scanned: usize,
    pub closed_ports: usize,
    pub filtered_ports: usize,
    pub error_ports: usize,
    /// Open ports, ascending.
    pub open_ports: Vec<ScanResult>,
}

impl HostOutcome {
    fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            address: None,
            reachable: false,
            state: HostState::Partial,
            ports_total: 0,
            ports_scanned: 0,
            closed_ports: 0,
            filtered_ports: 0,
            error_ports: 0,
            open_ports: Vec::new(),
        }
    }

    /// Open port numbers, ascending.
    pub fn open_port_numbers(&self) -> Vec<Port> {
        self.open_ports.iter().map(|r| r.port).collect()
    }

    /// Check if the sweep was cut short.
    pub fn is_partial(&self) -> bool {
        self.state == HostState::Partial
    }
}

struct Entry {
    outcome: HostOutcome,
    finalized: bool,
}

impl Entry {
    fn finalize(&mut self, state: HostState) -> &HostOutcome {
        self.outcome.state = state;
        self.outcome.open_ports.sort_by_key(|r| r.port);
        self.finalized = true;
        &self.outcome
    }
}

/// Accumulates [`ScanEvent`]s into [`HostOutcome`]s.
///
/// Hosts keep the order in which they were first seen.
#[derive(Default)]
pub struct ResultAggregator {
    order: Vec<String>,
    hosts: HashMap<String, Entry>,
}

impl ResultAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in. Returns the host's outcome when this event
    /// finalized it.
    pub fn record(&mut self, event: ScanEvent) -> Option<&HostOutcome> {
        let entry = self.entry(event.host());

        match event {
            ScanEvent::Queued { total, .. } => {
                entry.outcome.ports_total = total;
                None
            }
            ScanEvent::Started { address, .. } => {
                entry.outcome.address = Some(address);
                entry.outcome.reachable = true;
                None
            }
            ScanEvent::Result(result) => {
                let outcome = &mut entry.outcome;
                outcome.ports_scanned += 1;
                match &result.outcome {
                    Outcome::Open { .. } => outcome.open_ports.push(result),
                    Outcome::Closed => outcome.closed_ports += 1,
                    Outcome::Filtered => outcome.filtered_ports += 1,
                    Outcome::Error { .. } => outcome.error_ports += 1,
                }
                None
            }
            ScanEvent::Skipped { reason, .. } => {
                entry.outcome.reachable = false;
                let state = match reason {
                    SkipReason::Unresolvable(reason) => HostState::Unresolvable(reason),
                    SkipReason::Unreachable => HostState::Unreachable,
                    SkipReason::Cancelled => HostState::Partial,
                };
                Some(entry.finalize(state))
            }
            ScanEvent::Finished { cancelled, .. } => {
                let state = if cancelled {
                    HostState::Partial
                } else {
                    HostState::Complete
                };
                Some(entry.finalize(state))
            }
        }
    }

    /// All outcomes in first-seen order. Hosts that never finished are
    /// finalized as partial with whatever arrived.
    pub fn finish(mut self) -> Vec<HostOutcome> {
        self.order
            .iter()
            .filter_map(|host| self.hosts.remove(host))
            .map(|mut entry| {
                if !entry.finalized {
                    entry.finalize(HostState::Partial);
                }
                entry.outcome
            })
            .collect()
    }

    fn entry(&mut self, host: &str) -> &mut Entry {
        if !self.hosts.contains_key(host) {
            self.order.push(host.to_string());
        }
        self.hosts.entry(host.to_string()).or_insert_with(|| Entry {
            outcome: HostOutcome::new(host),
            finalized: false,
        })
    }
}
