//! Command-line interface definitions.
//!
//! `slyscan [OPTIONS] --ports <PORTS> <HOSTS>...`

mod scan;

pub use scan::ScanCommand;

use crate::config::AppSettings;
use crate::error::ConfigResult;
use clap::Parser;
use std::path::PathBuf;

/// slyscan - a concurrent TCP connect port scanner.
///
/// Sweeps one or more hosts (IPs, hostnames or CIDR ranges) for open TCP
/// ports, optionally grabbing the banner each service sends on connect.
#[derive(Parser, Debug)]
#[command(name = "slyscan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A fast, concurrent TCP port scanner", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub scan: ScanCommand,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress progress bars and non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a settings file (defaults to the XDG config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Settings from `--config`, or from the default location.
    pub fn settings(&self) -> ConfigResult<AppSettings> {
        match &self.config {
            Some(path) => AppSettings::load_from(path),
            None => AppSettings::load(),
        }
    }

    /// Whether progress bars stay off the terminal.
    pub fn progress_hidden(&self) -> bool {
        self.quiet || self.scan.output != OutputFormat::Plain
    }

    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}
