//! Configuration management for slyscan.
//!
//! Provides XDG-compliant discovery of the settings file and the
//! defaults every command-line flag falls back to.

mod settings;

pub use settings::{AppSettings, Paths, PrecheckSettings};
