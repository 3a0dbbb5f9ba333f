//! Observability infrastructure for the pod monitor
//!
//! Provides:
//! - Prometheus metrics (tick latency, records written, skips, fetch and persistence errors)
//! - Structured logging of lifecycle and tick events with tracing

use crate::error::{FetchError, PersistenceError};
use crate::models::Scope;
use chrono::{DateTime, Utc};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for tick latency (in seconds)
const TICK_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    tick_latency_seconds: Histogram,
    ticks_total: IntCounter,
    records_written: IntCounter,
    entries_skipped: IntCounter,
    fetch_errors: IntCounterVec,
    persistence_errors: IntCounter,
    series_tracked: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "pod_monitor_tick_latency_seconds",
                "Time spent on one fetch-normalize-record-publish cycle",
                TICK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            ticks_total: register_int_counter!(
                "pod_monitor_ticks_total",
                "Number of ticks attempted"
            )
            .expect("Failed to register ticks_total"),

            records_written: register_int_counter!(
                "pod_monitor_records_written_total",
                "Usage records durably appended to the CSV store"
            )
            .expect("Failed to register records_written"),

            entries_skipped: register_int_counter!(
                "pod_monitor_entries_skipped_total",
                "Snapshot entries dropped as malformed"
            )
            .expect("Failed to register entries_skipped"),

            fetch_errors: register_int_counter_vec!(
                "pod_monitor_fetch_errors_total",
                "Failed metrics API fetches by error kind",
                &["kind"]
            )
            .expect("Failed to register fetch_errors"),

            persistence_errors: register_int_counter!(
                "pod_monitor_persistence_errors_total",
                "Failed record or audit writes"
            )
            .expect("Failed to register persistence_errors"),

            series_tracked: register_int_gauge!(
                "pod_monitor_series_tracked",
                "Pods with a live view rolling window"
            )
            .expect("Failed to register series_tracked"),
        }
    }
}

/// Handle to the global Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (registers the global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_tick(&self, elapsed: Duration) {
        self.inner().ticks_total.inc();
        self.inner()
            .tick_latency_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn add_records_written(&self, count: usize) {
        self.inner().records_written.inc_by(count as u64);
    }

    pub fn add_entries_skipped(&self, count: usize) {
        self.inner().entries_skipped.inc_by(count as u64);
    }

    pub fn inc_fetch_errors(&self, kind: &str) {
        self.inner().fetch_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_persistence_errors(&self) {
        self.inner().persistence_errors.inc();
    }

    pub fn set_series_tracked(&self, count: usize) {
        self.inner().series_tracked.set(count as i64);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for monitor events
///
/// Every event carries an `event` field and the poll scope so a failed tick
/// can be diagnosed from the log alone.
#[derive(Clone)]
pub struct StructuredLogger {
    scope: String,
}

impl StructuredLogger {
    pub fn new(scope: &Scope) -> Self {
        Self {
            scope: scope.to_string(),
        }
    }

    pub fn log_startup(&self, version: &str, interval: Duration, window_size: usize) {
        info!(
            event = "monitor_started",
            scope = %self.scope,
            monitor_version = %version,
            interval_secs = interval.as_secs(),
            window_size = window_size,
            "Pod monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            scope = %self.scope,
            reason = %reason,
            "Pod monitor shutting down"
        );
    }

    pub fn log_tick(
        &self,
        tick: u64,
        observed_at: DateTime<Utc>,
        records: usize,
        skipped: usize,
        elapsed: Duration,
    ) {
        info!(
            event = "tick_completed",
            scope = %self.scope,
            tick = tick,
            observed_at = %observed_at,
            records = records,
            skipped = skipped,
            elapsed_ms = elapsed.as_millis() as u64,
            "Metrics updated"
        );
    }

    pub fn log_fetch_failure(&self, tick: u64, observed_at: DateTime<Utc>, err: &FetchError) {
        error!(
            event = "fetch_failed",
            scope = %self.scope,
            tick = tick,
            observed_at = %observed_at,
            kind = err.kind(),
            error = %err,
            "Error fetching pod metrics"
        );
    }

    pub fn log_skipped_entry(
        &self,
        tick: u64,
        pod_name: Option<&str>,
        container_name: Option<&str>,
        reason: &str,
    ) {
        warn!(
            event = "entry_skipped",
            scope = %self.scope,
            tick = tick,
            pod_name = pod_name.unwrap_or("-"),
            container_name = container_name.unwrap_or("-"),
            kind = "malformed_data",
            reason = %reason,
            "Skipping malformed metrics entry"
        );
    }

    pub fn log_persistence_failure(
        &self,
        tick: u64,
        observed_at: DateTime<Utc>,
        consecutive: u32,
        err: &PersistenceError,
    ) {
        error!(
            event = "tick_degraded",
            scope = %self.scope,
            tick = tick,
            observed_at = %observed_at,
            kind = "persistence",
            consecutive_failures = consecutive,
            error = %err,
            "Failed to persist usage records"
        );
    }

    pub fn log_escalation(&self, reason: &str) {
        error!(
            event = "monitor_escalated",
            scope = %self.scope,
            reason = %reason,
            "Unrecoverable failure, stopping scheduler"
        );
    }
}
