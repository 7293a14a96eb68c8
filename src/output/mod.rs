//! Output formatting module.
//!
//! Provides formatters for plain text, JSON, and CSV output of scan reports.
//! Every formatter writes to any `io::Write`; [`print_report`] targets stdout.

mod csv_format;
mod json_format;
mod plain;

pub use csv_format::write_csv;
pub use json_format::write_json;
pub use plain::{print_error, print_scan_header, write_plain};

use crate::cli::OutputFormat;
use crate::error::CliResult;
use crate::scanner::ScanReport;
use std::io;

/// Format and print a scan report according to the specified format.
pub fn print_report(report: &ScanReport, format: OutputFormat) -> CliResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Plain => write_plain(&mut out, report)?,
        OutputFormat::Json => write_json(&mut out, report)?,
        OutputFormat::Csv => write_csv(&mut out, report)?,
    }
    Ok(())
}
