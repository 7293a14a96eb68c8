//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use crate::scanner::{HostOutcome, HostState, ScanReport};
use crate::services::service_label;
use console::style;
use std::io::{self, Write};

const RULE: &str = "───────────────────────────────────────────────────────────────";

/// Write a report in human-readable plain text format.
pub fn write_plain<W: Write>(out: &mut W, report: &ScanReport) -> io::Result<()> {
    writeln!(out)?;
    for host in &report.hosts {
        write_host(out, host)?;
        writeln!(out)?;
    }

    let open = report.open_count();
    writeln!(
        out,
        "  {} {} host(s) scanned in {:.2}s, {} open port(s)",
        style("Summary:").bold(),
        report.hosts.len(),
        report.duration_ms as f64 / 1000.0,
        style(open).green().bold()
    )?;
    if report.cancelled {
        writeln!(
            out,
            "  {}",
            style("Scan interrupted; results are partial.").yellow()
        )?;
    }
    writeln!(out)?;

    Ok(())
}

fn write_host<W: Write>(out: &mut W, host: &HostOutcome) -> io::Result<()> {
    match host.address {
        Some(address) if address.to_string() != host.host => writeln!(
            out,
            "  {} {} ({})",
            style("Host:").bold(),
            style(&host.host).white().bold(),
            address
        )?,
        _ => writeln!(
            out,
            "  {} {}",
            style("Host:").bold(),
            style(&host.host).white().bold()
        )?,
    }

    match &host.state {
        HostState::Unresolvable(reason) => {
            return writeln!(
                out,
                "  {}",
                style(format!("Could not resolve host: {}", reason)).red()
            );
        }
        HostState::Unreachable => {
            return writeln!(
                out,
                "  {}",
                style("Host did not answer the reachability check; skipped.").yellow()
            );
        }
        HostState::Partial => writeln!(
            out,
            "  {}",
            style(format!(
                "Partial: {} of {} ports scanned",
                host.ports_scanned, host.ports_total
            ))
            .yellow()
        )?,
        HostState::Complete => {}
    }

    if host.open_ports.is_empty() {
        return writeln!(out, "  {}", style("No open ports found on host").dim());
    }

    writeln!(out, "  {}", style(RULE).dim())?;
    writeln!(
        out,
        "  {:>6}  {:<15}  {}",
        style("PORT").bold(),
        style("SERVICE").bold(),
        style("BANNER").bold()
    )?;
    writeln!(out, "  {}", style(RULE).dim())?;

    for result in &host.open_ports {
        let banner = result
            .outcome
            .banner()
            .map(|b| truncate_string(b, 40))
            .unwrap_or_default();
        writeln!(
            out,
            "  {:>6}  {:<15}  {}",
            style(result.port).green().bold(),
            service_label(result.port),
            style(banner).dim()
        )?;
    }
    writeln!(out, "  {}", style(RULE).dim())
}

/// Print a scan header before scanning begins.
pub fn print_scan_header(hosts: usize, ports: usize) {
    eprintln!();
    eprintln!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("slyscan").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!(
        "{} Scanning {} port(s) on {} host(s)...",
        style("•").dim(),
        style(ports).white().bold(),
        style(hosts).white().bold()
    );
    eprintln!();
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
