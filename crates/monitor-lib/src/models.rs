//! Core data models for the pod monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal written wherever a metric could not be observed
pub const UNAVAILABLE: &str = "unavailable";

/// Namespace boundary a poll targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Namespace(String),
    AllNamespaces,
}

impl Scope {
    /// Build a scope from an optional namespace; `None`, `""` and `"*"` mean cluster-wide
    pub fn from_namespace(namespace: Option<&str>) -> Self {
        match namespace.map(str::trim) {
            None | Some("") | Some("*") => Scope::AllNamespaces,
            Some(ns) => Scope::Namespace(ns.to_string()),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Scope::Namespace(ns) => Some(ns),
            Scope::AllNamespaces => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Namespace(ns) => f.write_str(ns),
            Scope::AllNamespaces => f.write_str("*"),
        }
    }
}

/// A metric value, or the explicit marker that it was not reported.
///
/// Serializes as the bare number, or `null` when unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurement<T> {
    Value(T),
    Unavailable,
}

impl<T: Copy> Measurement<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Measurement::Value(v) => Some(*v),
            Measurement::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Measurement::Value(_))
    }
}

impl<T> From<Option<T>> for Measurement<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Measurement::Unavailable, Measurement::Value)
    }
}

impl<T: fmt::Display> fmt::Display for Measurement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Value(v) => v.fmt(f),
            Measurement::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

/// One normalized measurement for a single container at a single instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
    /// CPU usage in millicores
    pub cpu_usage: Measurement<f64>,
    /// Memory usage in bytes
    pub memory_usage: Measurement<u64>,
}

impl UsageRecord {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            namespace: self.namespace.clone(),
            pod_name: self.pod_name.clone(),
        }
    }
}

/// Raw per-container entry as returned by the metrics API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContainerUsage {
    pub namespace: Option<String>,
    pub pod_name: Option<String>,
    pub container_name: Option<String>,
    /// Kubernetes quantity string, e.g. `150m`
    pub cpu: Option<String>,
    /// Kubernetes quantity string, e.g. `256Mi`
    pub memory: Option<String>,
}

/// Raw result of one poll
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub scope: Scope,
    pub entries: Vec<RawContainerUsage>,
}

impl Snapshot {
    pub fn new(scope: Scope, entries: Vec<RawContainerUsage>) -> Self {
        Self { scope, entries }
    }

    pub fn empty(scope: Scope) -> Self {
        Self::new(scope, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity of a tracked live-view series (one pod)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub namespace: String,
    pub pod_name: String,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_namespace() {
        assert_eq!(Scope::from_namespace(None), Scope::AllNamespaces);
        assert_eq!(Scope::from_namespace(Some("*")), Scope::AllNamespaces);
        assert_eq!(Scope::from_namespace(Some("")), Scope::AllNamespaces);
        assert_eq!(
            Scope::from_namespace(Some("default")),
            Scope::Namespace("default".to_string())
        );
    }

    #[test]
    fn test_measurement_unavailable_is_not_zero() {
        let missing: Measurement<u64> = None.into();
        assert_ne!(missing, Measurement::Value(0));
        assert_eq!(missing.to_string(), "unavailable");
        assert_eq!(serde_json::to_string(&missing).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&Measurement::Value(0u64)).unwrap(),
            "0"
        );
    }
}
