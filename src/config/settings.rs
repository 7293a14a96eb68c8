//! Application settings and paths.
//!
//! Settings are read from a JSON file in the XDG config directory
//! (`~/.config/slyscan/settings.json`) when one exists. Every field is
//! optional; missing fields take their defaults.

use crate::error::{ConfigError, ConfigResult};
use crate::scanner::precheck::{DEFAULT_MIN_PORTS, DEFAULT_PRECHECK_PORTS};
use crate::scanner::{HostPrecheck, SchedulerConfig};
use crate::types::Port;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application directory paths following the XDG Base Directory layout.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/slyscan)
    pub config_dir: PathBuf,
}

impl Paths {
    /// Locate the platform configuration directory.
    pub fn discover() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "slyscan", "slyscan")
            .ok_or(ConfigError::DirectoryNotFound)?;

        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}

/// Host precheck settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecheckSettings {
    pub enabled: bool,
    pub ports: Vec<u16>,
    pub timeout_ms: u64,
    /// Sweeps smaller than this skip the precheck.
    pub min_ports: usize,
}

impl Default for PrecheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ports: DEFAULT_PRECHECK_PORTS.to_vec(),
            timeout_ms: 1000,
            min_ports: DEFAULT_MIN_PORTS,
        }
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Maximum in-flight attempts across all hosts.
    pub global_concurrency: usize,
    /// Maximum in-flight attempts per host.
    pub host_concurrency: usize,
    /// Maximum hosts swept at once.
    pub parallel_hosts: usize,
    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Banner read timeout in milliseconds.
    pub read_timeout_ms: u64,
    pub banner: bool,
    pub precheck: PrecheckSettings,
    pub progress_steps: usize,
    /// Attempts per second, 0 for unlimited.
    pub rate_limit: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            global_concurrency: 500,
            host_concurrency: 64,
            parallel_hosts: 16,
            timeout_ms: 1000,
            read_timeout_ms: 1000,
            banner: true,
            precheck: PrecheckSettings::default(),
            progress_steps: 64,
            rate_limit: 0,
        }
    }
}

impl AppSettings {
    /// Load settings from the default location, falling back to defaults
    /// when there is no settings file.
    pub fn load() -> ConfigResult<Self> {
        let file = match Paths::discover() {
            Ok(paths) => paths.settings_file(),
            Err(e) => {
                debug!(error = %e, "no configuration directory, using defaults");
                return Ok(Self::default());
            }
        };

        if !file.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let settings: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Reject settings the scanner cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let nonzero: [(&'static str, u64); 6] = [
            ("global_concurrency", self.global_concurrency as u64),
            ("host_concurrency", self.host_concurrency as u64),
            ("parallel_hosts", self.parallel_hosts as u64),
            ("timeout_ms", self.timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("progress_steps", self.progress_steps as u64),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.precheck.enabled {
            if self.precheck.timeout_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "precheck.timeout_ms",
                    reason: "must be greater than zero".to_string(),
                });
            }
            if self.precheck.ports.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "precheck.ports",
                    reason: "at least one port is required".to_string(),
                });
            }
            if self.precheck.ports.contains(&0) {
                return Err(ConfigError::InvalidValue {
                    field: "precheck.ports",
                    reason: "port 0 is not scannable".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Banner read timeout, `None` when banner grabbing is off.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.banner
            .then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            global_concurrency: self.global_concurrency,
            max_parallel_hosts: self.parallel_hosts,
            progress_steps: self.progress_steps,
        }
    }

    /// The configured precheck, or `None` when disabled.
    pub fn host_precheck(&self) -> Option<HostPrecheck> {
        if !self.precheck.enabled {
            return None;
        }
        let ports = self.precheck.ports.iter().copied().filter_map(Port::new).collect();
        Some(
            HostPrecheck::new(ports, Duration::from_millis(self.precheck.timeout_ms))
                .with_min_ports(self.precheck.min_ports),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.global_concurrency, 500);
        assert_eq!(settings.host_concurrency, 64);
        assert_eq!(settings.timeout(), Duration::from_millis(1000));
        assert_eq!(settings.read_timeout(), Some(Duration::from_millis(1000)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"timeout_ms": 250, "precheck": {{"enabled": false}}}}"#).unwrap();

        let settings = AppSettings::load_from(file.path()).unwrap();
        assert_eq!(settings.timeout_ms, 250);
        assert_eq!(settings.global_concurrency, 500);
        assert!(!settings.precheck.enabled);
        assert_eq!(settings.precheck.timeout_ms, 1000);
        assert!(settings.host_precheck().is_none());
    }

    #[test]
    fn test_malformed_file_is_invalid_format() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = AppSettings::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat(_)));
    }

    #[test]
    fn test_missing_file_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppSettings::load_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let settings = AppSettings {
            host_concurrency: 0,
            ..AppSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "host_concurrency",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_ignores_disabled_precheck() {
        let settings = AppSettings {
            precheck: PrecheckSettings {
                enabled: false,
                ports: Vec::new(),
                ..PrecheckSettings::default()
            },
            ..AppSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_banner_off_disables_read_timeout() {
        let settings = AppSettings {
            banner: false,
            ..AppSettings::default()
        };
        assert_eq!(settings.read_timeout(), None);
    }

    #[test]
    fn test_precheck_carries_min_ports() {
        let settings = AppSettings::default();
        let precheck = settings.host_precheck().unwrap();
        assert!(!precheck.applies_to(1023));
        assert!(precheck.applies_to(1024));
        assert_eq!(precheck.ports().len(), DEFAULT_PRECHECK_PORTS.len());
    }
}
