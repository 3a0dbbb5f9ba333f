//! Error taxonomy for the monitoring pipeline
//!
//! Fetch and malformed-data errors stay local to a tick. Only configuration
//! errors and repeated auth/persistence failures end the process.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Missing or invalid configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("cluster configuration unavailable: {0}")]
    Cluster(String),

    #[error("cluster unreachable at startup: {0}")]
    Unreachable(String),
}

/// Failure to obtain a snapshot from the metrics API
#[derive(Debug, Error)]
pub enum FetchError {
    /// Credentials rejected or missing
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout or server-side error; retried next tick
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The API answered with something we cannot use
    #[error("malformed or unsupported metrics response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Auth(_) => "auth",
            FetchError::Transient(_) => "transient_fetch",
            FetchError::Malformed(_) => "malformed_response",
        }
    }
}

/// Why a single snapshot entry was dropped by the normalizer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedDataError {
    #[error("entry has no pod name")]
    MissingPodName,

    #[error("entry has no container name")]
    MissingContainerName,

    #[error("entry has no namespace and the scope covers all namespaces")]
    MissingNamespace,

    #[error("unparseable {metric} quantity `{raw}`")]
    InvalidQuantity { metric: &'static str, raw: String },
}

/// Failure to durably append a record or audit line
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("existing CSV header in {path} does not match schema v{version}: found `{found}`")]
    SchemaMismatch {
        path: PathBuf,
        version: u32,
        found: String,
    },

    #[error("write did not complete within {0:?}")]
    Timeout(Duration),

    #[error("blocking write task failed: {0}")]
    Task(String),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reasons the scheduler stops with an error
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("giving up after {count} consecutive authentication failures: {last}")]
    AuthCeiling { count: u32, last: FetchError },

    #[error("giving up after {count} consecutive degraded ticks: {last}")]
    PersistenceCeiling { count: u32, last: PersistenceError },

    #[error("failed to flush recorder on shutdown: {0}")]
    Flush(#[source] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds_are_distinct() {
        let kinds = [
            FetchError::Auth("denied".into()).kind(),
            FetchError::Transient("timeout".into()).kind(),
            FetchError::Malformed("bad json".into()).kind(),
        ];
        assert_eq!(kinds, ["auth", "transient_fetch", "malformed_response"]);
    }

    #[test]
    fn test_monitor_error_display_includes_cause() {
        let err = MonitorError::AuthCeiling {
            count: 3,
            last: FetchError::Auth("token expired".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 consecutive"));
        assert!(msg.contains("token expired"));
    }
}
