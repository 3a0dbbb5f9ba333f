//! Poll scheduler
//!
//! Drives the fixed-interval tick: fetch a snapshot, normalize it, then hand
//! every record to the recorder and the live view publisher. Ticks run one at
//! a time on a single task; a tick that overruns the interval delays the next
//! one instead of overlapping it.
//!
//! A failed tick is logged and the next one proceeds unchanged. The scheduler
//! only stops on the shutdown signal or when consecutive auth failures or
//! degraded ticks reach their configured ceiling. The shutdown signal is
//! checked between ticks, so an in-flight tick always completes; the recorder
//! is flushed on every exit path.

use crate::config::MonitorConfig;
use crate::error::{ConfigError, FetchError, MonitorError, PersistenceError};
use crate::health::{components, HealthRegistry};
use crate::models::{Scope, Snapshot};
use crate::normalizer::normalize;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::publisher::LiveViewPublisher;
use crate::recorder::{AuditEvent, DurableRecorder};
use crate::source::MetricsSource;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Scheduler timing and escalation settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between tick starts (default: 5 seconds)
    pub interval: Duration,
    /// Consecutive auth failures before stopping; 0 disables
    pub max_consecutive_auth_failures: u32,
    /// Consecutive degraded ticks before stopping; 0 disables
    pub max_consecutive_persistence_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_consecutive_auth_failures: 3,
            max_consecutive_persistence_failures: 5,
        }
    }
}

impl From<&MonitorConfig> for SchedulerConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_consecutive_auth_failures: config.max_consecutive_auth_failures,
            max_consecutive_persistence_failures: config.max_consecutive_persistence_failures,
        }
    }
}

/// Where the scheduler is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ticking,
    Recording,
    Stopped,
}

/// How a tick ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    /// The fetch failed; nothing was recorded or published
    FetchFailed { kind: &'static str },
    /// At least one record could not be persisted
    Degraded,
}

/// Summary of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub observed_at: DateTime<Utc>,
    pub records_written: usize,
    pub records_dropped: usize,
    pub published: usize,
    pub skipped: usize,
    pub outcome: TickOutcome,
}

impl TickReport {
    fn new(tick: u64, observed_at: DateTime<Utc>) -> Self {
        Self {
            tick,
            observed_at,
            records_written: 0,
            records_dropped: 0,
            published: 0,
            skipped: 0,
            outcome: TickOutcome::Completed,
        }
    }
}

/// Fixed-interval sampling loop owning the whole pipeline
pub struct PollScheduler {
    source: Arc<dyn MetricsSource>,
    recorder: DurableRecorder,
    publisher: LiveViewPublisher,
    scope: Scope,
    config: SchedulerConfig,
    health: Option<HealthRegistry>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    state: SchedulerState,
    tick_count: u64,
    last_observed_at: Option<DateTime<Utc>>,
    consecutive_auth_failures: u32,
    consecutive_persistence_failures: u32,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        recorder: DurableRecorder,
        publisher: LiveViewPublisher,
        scope: Scope,
        config: SchedulerConfig,
    ) -> Self {
        let logger = StructuredLogger::new(&scope);
        Self {
            source,
            recorder,
            publisher,
            scope,
            config,
            health: None,
            metrics: MonitorMetrics::new(),
            logger,
            state: SchedulerState::Idle,
            tick_count: 0,
            last_observed_at: None,
            consecutive_auth_failures: 0,
            consecutive_persistence_failures: 0,
        }
    }

    /// Build a scheduler from validated monitor configuration
    pub fn from_config(
        source: Arc<dyn MetricsSource>,
        recorder: DurableRecorder,
        publisher: LiveViewPublisher,
        config: &MonitorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            source,
            recorder,
            publisher,
            config.scope(),
            SchedulerConfig::from(config),
        ))
    }

    /// Report tick outcomes to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn publisher(&self) -> &LiveViewPublisher {
        &self.publisher
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Run ticks until `shutdown` fires or a failure ceiling is reached
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), MonitorError> {
        info!(
            scope = %self.scope,
            interval_secs = self.config.interval.as_secs_f64(),
            "Starting poll scheduler"
        );
        self.annotate(AuditEvent::Started {
            scope: self.scope.clone(),
            interval: self.config.interval,
        })
        .await;
        if let Some(health) = &self.health {
            health.set_ready(true).await;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping poll scheduler");
                    break Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        break Err(e);
                    }
                }
            }
        };

        self.stop(outcome).await
    }

    /// Run a single tick: fetch, normalize, then record and publish
    pub async fn tick(&mut self) -> Result<TickReport, MonitorError> {
        self.tick_count += 1;
        let tick = self.tick_count;
        let started = Instant::now();
        let observed_at = self.next_observed_at(Utc::now());
        self.state = SchedulerState::Ticking;

        let fetched = self.source.fetch(&self.scope).await;
        let result = match fetched {
            Ok(snapshot) => {
                self.consecutive_auth_failures = 0;
                self.set_health(components::METRICS_SOURCE, None).await;
                self.process(tick, observed_at, snapshot).await
            }
            Err(err) => self.fetch_failed(tick, observed_at, err).await,
        };

        self.metrics.observe_tick(started.elapsed());
        self.state = SchedulerState::Idle;

        if let Ok(report) = &result {
            if report.outcome == TickOutcome::Completed {
                self.logger.log_tick(
                    tick,
                    observed_at,
                    report.records_written,
                    report.skipped,
                    started.elapsed(),
                );
            }
        }
        result
    }

    async fn process(
        &mut self,
        tick: u64,
        observed_at: DateTime<Utc>,
        snapshot: Snapshot,
    ) -> Result<TickReport, MonitorError> {
        self.state = SchedulerState::Recording;
        let mut report = TickReport::new(tick, observed_at);
        let mut write_error: Option<PersistenceError> = None;

        let mut records = normalize(snapshot, observed_at);
        for record in records.by_ref() {
            // Once a write fails the rest of the tick is dropped, not retried
            if write_error.is_none() {
                match self.recorder.record(&record).await {
                    Ok(()) => report.records_written += 1,
                    Err(e) => {
                        report.records_dropped += 1;
                        write_error = Some(e);
                    }
                }
            } else {
                report.records_dropped += 1;
            }

            self.publisher.publish(&record);
            report.published += 1;
        }

        let skipped = records.skipped().to_vec();
        report.skipped = skipped.len();
        for entry in skipped {
            let reason = entry.reason.to_string();
            self.logger.log_skipped_entry(
                tick,
                entry.pod_name.as_deref(),
                entry.container_name.as_deref(),
                &reason,
            );
            self.annotate(AuditEvent::EntrySkipped {
                tick,
                observed_at,
                pod_name: entry.pod_name,
                container_name: entry.container_name,
                reason,
            })
            .await;
        }

        let pruned = self.publisher.end_tick();
        if pruned > 0 {
            debug!(tick, pruned, "Pods stopped reporting, dropped from live view");
        }

        self.metrics.add_records_written(report.records_written);
        self.metrics.add_entries_skipped(report.skipped);
        self.metrics.set_series_tracked(self.publisher.series_count());

        let live_view = (!self.publisher.is_sink_available()).then_some("live view sink unavailable");
        self.set_health(components::LIVE_VIEW, live_view).await;

        match write_error {
            None => {
                self.consecutive_persistence_failures = 0;
                self.set_health(components::RECORDER, None).await;
                self.annotate(AuditEvent::TickCompleted {
                    tick,
                    observed_at,
                    records: report.records_written,
                    skipped: report.skipped,
                })
                .await;
                Ok(report)
            }
            Some(err) => {
                report.outcome = TickOutcome::Degraded;
                self.persistence_failed(&report, err).await?;
                Ok(report)
            }
        }
    }

    async fn persistence_failed(
        &mut self,
        report: &TickReport,
        err: PersistenceError,
    ) -> Result<(), MonitorError> {
        self.consecutive_persistence_failures += 1;
        let count = self.consecutive_persistence_failures;

        self.metrics.inc_persistence_errors();
        self.logger
            .log_persistence_failure(report.tick, report.observed_at, count, &err);
        self.set_health(components::RECORDER, Some(&err.to_string()))
            .await;
        self.annotate(AuditEvent::TickDegraded {
            tick: report.tick,
            observed_at: report.observed_at,
            written: report.records_written,
            dropped: report.records_dropped,
            error: err.to_string(),
        })
        .await;

        if reached(count, self.config.max_consecutive_persistence_failures) {
            if let Some(health) = &self.health {
                health
                    .set_unhealthy(components::RECORDER, err.to_string())
                    .await;
            }
            return Err(MonitorError::PersistenceCeiling { count, last: err });
        }
        Ok(())
    }

    async fn fetch_failed(
        &mut self,
        tick: u64,
        observed_at: DateTime<Utc>,
        err: FetchError,
    ) -> Result<TickReport, MonitorError> {
        self.metrics.inc_fetch_errors(err.kind());
        self.logger.log_fetch_failure(tick, observed_at, &err);
        self.annotate(AuditEvent::FetchFailed {
            tick,
            scope: self.scope.clone(),
            observed_at,
            kind: err.kind(),
            error: err.to_string(),
        })
        .await;

        if matches!(err, FetchError::Auth(_)) {
            self.consecutive_auth_failures += 1;
        } else {
            self.consecutive_auth_failures = 0;
        }

        let count = self.consecutive_auth_failures;
        if count > 0 && reached(count, self.config.max_consecutive_auth_failures) {
            if let Some(health) = &self.health {
                health
                    .set_unhealthy(components::METRICS_SOURCE, err.to_string())
                    .await;
            }
            return Err(MonitorError::AuthCeiling { count, last: err });
        }

        self.set_health(components::METRICS_SOURCE, Some(&err.to_string()))
            .await;

        let mut report = TickReport::new(tick, observed_at);
        report.outcome = TickOutcome::FetchFailed { kind: err.kind() };
        Ok(report)
    }

    async fn stop(&mut self, outcome: Result<(), MonitorError>) -> Result<(), MonitorError> {
        self.state = SchedulerState::Stopped;

        let reason = match &outcome {
            Ok(()) => "shutdown requested".to_string(),
            Err(e) => {
                self.logger.log_escalation(&e.to_string());
                e.to_string()
            }
        };

        self.annotate(AuditEvent::Stopped {
            reason: reason.clone(),
        })
        .await;
        if let Some(health) = &self.health {
            health.set_ready(false).await;
        }

        let flushed = self.recorder.flush().await;
        self.logger.log_shutdown(&reason);

        match (outcome, flushed) {
            (Err(e), Err(flush_err)) => {
                warn!(error = %flush_err, "Recorder flush failed during shutdown");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(flush_err)) => Err(MonitorError::Flush(flush_err)),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Tick timestamps at millisecond precision, strictly increasing
    fn next_observed_at(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(3);
        let observed_at = match self.last_observed_at {
            Some(last) if now <= last => {
                debug!(last = %last, now = %now, "Wall clock did not advance, bumping tick timestamp");
                last + chrono::Duration::milliseconds(1)
            }
            _ => now,
        };
        self.last_observed_at = Some(observed_at);
        observed_at
    }

    async fn annotate(&self, event: AuditEvent) {
        if let Err(e) = self.recorder.annotate(event).await {
            self.metrics.inc_persistence_errors();
            warn!(error = %e, "Failed to write audit log entry");
        }
    }

    /// `None` marks healthy, `Some(message)` degraded
    async fn set_health(&self, component: &str, problem: Option<&str>) {
        if let Some(health) = &self.health {
            match problem {
                None => health.set_healthy(component).await,
                Some(message) => health.set_degraded(component, message).await,
            }
        }
    }
}

fn reached(count: u32, ceiling: u32) -> bool {
    ceiling > 0 && count >= ceiling
}
