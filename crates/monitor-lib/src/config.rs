//! Monitor configuration

use crate::error::ConfigError;
use crate::models::Scope;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// CSV store location
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,

    /// Audit log location
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Seconds between tick starts
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Points kept per pod in the live view
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Namespace to poll; empty or `*` polls every namespace
    #[serde(default = "default_namespace_scope")]
    pub namespace_scope: Option<String>,

    /// Upper bound on one metrics API call
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Upper bound on one record write
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Consecutive auth failures before stopping (0 = never)
    #[serde(default = "default_max_auth_failures")]
    pub max_consecutive_auth_failures: u32,

    /// Consecutive degraded ticks before stopping (0 = never)
    #[serde(default = "default_max_persistence_failures")]
    pub max_consecutive_persistence_failures: u32,

    /// Port for health, metrics and live view endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("pod_metrics.csv")
}

fn default_log_path() -> PathBuf {
    PathBuf::from("pod_monitoring.log")
}

fn default_poll_interval() -> u64 {
    5
}

fn default_window_size() -> usize {
    10
}

fn default_namespace_scope() -> Option<String> {
    Some("default".to_string())
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    5
}

fn default_max_auth_failures() -> u32 {
    3
}

fn default_max_persistence_failures() -> u32 {
    5
}

fn default_api_port() -> u16 {
    8080
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            log_path: default_log_path(),
            poll_interval_secs: default_poll_interval(),
            window_size: default_window_size(),
            namespace_scope: default_namespace_scope(),
            fetch_timeout_secs: default_fetch_timeout(),
            write_timeout_secs: default_write_timeout(),
            max_consecutive_auth_failures: default_max_auth_failures(),
            max_consecutive_persistence_failures: default_max_persistence_failures(),
            api_port: default_api_port(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn scope(&self) -> Scope {
        Scope::from_namespace(self.namespace_scope.as_deref())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs", "must be greater than zero"));
        }
        if self.window_size == 0 {
            return Err(invalid("window_size", "must be greater than zero"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(invalid("fetch_timeout_secs", "must be greater than zero"));
        }
        if self.write_timeout_secs == 0 {
            return Err(invalid("write_timeout_secs", "must be greater than zero"));
        }
        if self.csv_path.as_os_str().is_empty() {
            return Err(invalid("csv_path", "must not be empty"));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(invalid("log_path", "must not be empty"));
        }
        if self.csv_path == self.log_path {
            return Err(invalid("log_path", "must differ from csv_path"));
        }
        if let Scope::Namespace(ns) = self.scope() {
            if !is_dns1123_label(&ns) {
                return Err(invalid(
                    "namespace_scope",
                    format!("`{ns}` is not a valid namespace name"),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Namespace names are RFC 1123 labels
fn is_dns1123_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}
