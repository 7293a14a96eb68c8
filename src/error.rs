//! Error types for slyscan.
//!
//! Uses `thiserror` for ergonomic error definitions. Only resolver-level and
//! pool-level failures ever reach a caller; per-attempt faults are folded
//! into an [`Outcome`](crate::scanner::Outcome) by the connector.

use crate::types::{PortError, TargetError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can abort (part of) a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid port specification: {0}")]
    InvalidPortSpec(#[from] PortError),

    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    #[error("failed to resolve host '{host}': {reason}")]
    HostUnresolvable { host: String, reason: String },

    #[error("worker pool unavailable: {0}")]
    ResourcePoolExhausted(String),

    #[error("scan aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults of a single connect attempt.
///
/// These never cross the connector boundary; they are logged and mapped
/// into an outcome.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("connect timed out")]
    ConnectTimeout,

    #[error("connection refused")]
    ConnectRefused,

    #[error("host or network unreachable: {0}")]
    Unreachable(std::io::Error),

    #[error("banner read timed out")]
    ReadTimeout,

    #[error("banner is not valid UTF-8")]
    DecodeFailure,

    #[error("service sent no banner")]
    EmptyBanner,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine the configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid settings format: {0}")]
    InvalidFormat(String),

    #[error("invalid setting '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors surfaced by the command layer.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<PortError> for CliError {
    fn from(err: PortError) -> Self {
        Self::Scan(ScanError::InvalidPortSpec(err))
    }
}

impl From<TargetError> for CliError {
    fn from(err: TargetError) -> Self {
        Self::Scan(ScanError::InvalidTarget(err))
    }
}

impl From<csv::Error> for CliError {
    fn from(err: csv::Error) -> Self {
        Self::Output(err.into())
    }
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for command handlers.
pub type CliResult<T> = Result<T, CliError>;
