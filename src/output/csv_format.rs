//! CSV output formatting.
//!
//! One row per open port. Hosts without open ports get a single row with
//! the port columns left empty, so every host appears at least once.

use crate::scanner::{HostOutcome, HostState, ScanReport};
use crate::services::service_label;
use std::io::Write;

fn state_label(state: &HostState) -> &'static str {
    match state {
        HostState::Complete => "complete",
        HostState::Partial => "partial",
        HostState::Unreachable => "unreachable",
        HostState::Unresolvable(_) => "unresolvable",
    }
}

fn address(host: &HostOutcome) -> String {
    host.address.map(|a| a.to_string()).unwrap_or_default()
}

/// Write the report as CSV.
pub fn write_csv<W: Write>(out: W, report: &ScanReport) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["host", "address", "state", "port", "service", "banner"])?;

    for host in &report.hosts {
        let address = address(host);
        let state = state_label(&host.state);

        if host.open_ports.is_empty() {
            wtr.write_record([host.host.as_str(), &address, state, "", "", ""])?;
            continue;
        }
        for result in &host.open_ports {
            wtr.write_record([
                host.host.as_str(),
                &address,
                state,
                &result.port.to_string(),
                service_label(result.port),
                result.outcome.banner().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
