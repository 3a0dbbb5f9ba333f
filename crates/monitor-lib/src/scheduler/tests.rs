//! Scheduler tests against a scripted metrics source
//!
//! The source replays a fixed list of fetch results so each test controls
//! exactly what every tick sees.

use super::*;
use crate::models::{Measurement, RawContainerUsage, SeriesKey};
use crate::source::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Replays scripted fetch results, then returns empty snapshots
struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<RawContainerUsage>, FetchError>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Vec<RawContainerUsage>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn fetch(&self, scope: &Scope) -> Result<Snapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match next {
            Some(Ok(entries)) => Ok(Snapshot::new(scope.clone(), entries)),
            Some(Err(e)) => Err(e),
            None => Ok(Snapshot::empty(scope.clone())),
        }
    }
}

fn entry(pod: &str, container: &str, cpu: &str, memory: Option<&str>) -> RawContainerUsage {
    RawContainerUsage {
        namespace: Some("default".to_string()),
        pod_name: Some(pod.to_string()),
        container_name: Some(container.to_string()),
        cpu: Some(cpu.to_string()),
        memory: memory.map(str::to_string),
    }
}

fn web_1() -> RawContainerUsage {
    entry("web-1", "app", "150m", Some("256Mi"))
}

struct Harness {
    dir: TempDir,
    source: Arc<ScriptedSource>,
}

impl Harness {
    fn new(source: ScriptedSource) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            source: Arc::new(source),
        }
    }

    fn csv_path(&self) -> PathBuf {
        self.dir.path().join("pod_metrics.csv")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("pod_monitoring.log")
    }

    fn scheduler(&self, config: SchedulerConfig) -> PollScheduler {
        let recorder =
            DurableRecorder::open(self.csv_path(), self.log_path(), Duration::from_secs(5))
                .unwrap();
        PollScheduler::new(
            self.source.clone(),
            recorder,
            LiveViewPublisher::headless(10),
            Scope::Namespace("default".to_string()),
            config,
        )
    }

    fn csv_rows(&self) -> Vec<String> {
        std::fs::read_to_string(self.csv_path())
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.log_path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn web_1_key() -> SeriesKey {
    SeriesKey {
        namespace: "default".to_string(),
        pod_name: "web-1".to_string(),
    }
}

#[tokio::test]
async fn test_tick_records_one_row_per_container() {
    let harness = Harness::new(ScriptedSource::new(vec![Ok(vec![web_1()])]));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());

    let report = scheduler.tick().await.unwrap();

    assert_eq!(report.outcome, TickOutcome::Completed);
    assert_eq!(report.records_written, 1);
    assert_eq!(report.published, 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    let rows = harness.csv_rows();
    assert_eq!(rows.len(), 1);
    let fields: Vec<&str> = rows[0].split(',').collect();
    assert_eq!(
        fields[0],
        report
            .observed_at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    );
    assert_eq!(&fields[1..], ["default", "web-1", "app", "150", "268435456"]);
}

#[tokio::test]
async fn test_transient_failure_writes_nothing_and_next_tick_recovers() {
    let harness = Harness::new(ScriptedSource::new(vec![
        Err(FetchError::Transient("connection refused".to_string())),
        Ok(vec![web_1()]),
    ]));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());

    let failed = scheduler.tick().await.unwrap();
    assert_eq!(
        failed.outcome,
        TickOutcome::FetchFailed {
            kind: "transient_fetch"
        }
    );
    assert!(harness.csv_rows().is_empty());

    let errors: Vec<String> = harness
        .log_lines()
        .into_iter()
        .filter(|l| l.contains(" ERROR "))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("fetch_failed"));
    assert!(errors[0].contains("scope=default"));
    assert!(errors[0].contains("connection refused"));

    let recovered = scheduler.tick().await.unwrap();
    assert_eq!(recovered.outcome, TickOutcome::Completed);
    assert_eq!(harness.csv_rows().len(), 1);
}

#[tokio::test]
async fn test_consecutive_ticks_same_pod() {
    let harness = Harness::new(ScriptedSource::new(vec![Ok(vec![web_1()]), Ok(vec![web_1()])]));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());

    let first = scheduler.tick().await.unwrap();
    let second = scheduler.tick().await.unwrap();
    assert!(first.observed_at < second.observed_at);

    let rows = harness.csv_rows();
    assert_eq!(rows.len(), 2);
    let stamps: Vec<&str> = rows.iter().map(|r| r.split(',').next().unwrap()).collect();
    assert!(stamps[0] < stamps[1], "timestamps not increasing: {stamps:?}");

    let window = scheduler.publisher().window(&web_1_key()).unwrap();
    let in_window: Vec<_> = window.iter().map(|r| r.timestamp).collect();
    assert_eq!(in_window, vec![first.observed_at, second.observed_at]);
}

#[tokio::test]
async fn test_empty_snapshot_is_a_normal_tick() {
    let harness = Harness::new(ScriptedSource::new(vec![Ok(vec![])]));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());

    let report = scheduler.tick().await.unwrap();

    assert_eq!(report.outcome, TickOutcome::Completed);
    assert_eq!(report.records_written, 0);
    assert!(harness.csv_rows().is_empty());
}

#[tokio::test]
async fn test_missing_memory_recorded_as_unavailable() {
    let harness = Harness::new(ScriptedSource::new(vec![Ok(vec![entry(
        "web-1", "app", "5m", None,
    )])]));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());

    scheduler.tick().await.unwrap();

    let rows = harness.csv_rows();
    assert!(rows[0].ends_with(",5,unavailable"), "row was {}", rows[0]);
    let window = scheduler.publisher().window(&web_1_key()).unwrap();
    assert_eq!(window.latest().unwrap().memory_usage, Measurement::Unavailable);
}

#[tokio::test]
async fn test_malformed_entry_skipped_and_annotated() {
    let harness = Harness::new(ScriptedSource::new(vec![Ok(vec![
        web_1(),
        entry("web-2", "app", "fast", Some("1Mi")),
    ])]));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());

    let report = scheduler.tick().await.unwrap();

    assert_eq!(report.outcome, TickOutcome::Completed);
    assert_eq!(report.records_written, 1);
    assert_eq!(report.skipped, 1);

    let lines = harness.log_lines();
    let skipped: Vec<&String> = lines.iter().filter(|l| l.contains("entry_skipped")).collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].contains("pod=web-2"));
    assert!(lines.iter().any(|l| l.contains("tick_completed tick=1 records=1 skipped=1")));
}

#[tokio::test]
async fn test_auth_failures_escalate_at_ceiling() {
    let denied = || Err(FetchError::Auth("Unauthorized (401)".to_string()));
    let harness = Harness::new(ScriptedSource::new(vec![denied(), denied(), denied()]));
    let mut scheduler = harness.scheduler(SchedulerConfig {
        max_consecutive_auth_failures: 3,
        ..Default::default()
    });

    assert!(scheduler.tick().await.is_ok());
    assert!(scheduler.tick().await.is_ok());
    let err = scheduler.tick().await.unwrap_err();

    assert!(matches!(err, MonitorError::AuthCeiling { count: 3, .. }));
}

#[tokio::test]
async fn test_auth_streak_reset_by_success() {
    let denied = || Err(FetchError::Auth("Forbidden (403)".to_string()));
    let harness = Harness::new(ScriptedSource::new(vec![
        denied(),
        Ok(vec![web_1()]),
        denied(),
        Err(FetchError::Transient("timeout".to_string())),
        denied(),
    ]));
    let mut scheduler = harness.scheduler(SchedulerConfig {
        max_consecutive_auth_failures: 2,
        ..Default::default()
    });

    for _ in 0..5 {
        assert!(scheduler.tick().await.is_ok());
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_persistence_failures_degrade_then_escalate() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![web_1()]), Ok(vec![web_1()])]));
    // Writes to /dev/full fail with ENOSPC
    let recorder = DurableRecorder::open(
        dir.path().join("pod_metrics.csv"),
        "/dev/full",
        Duration::from_secs(5),
    )
    .unwrap();
    let health = HealthRegistry::new();
    health.register_pipeline().await;

    let mut scheduler = PollScheduler::new(
        source,
        recorder,
        LiveViewPublisher::headless(10),
        Scope::Namespace("default".to_string()),
        SchedulerConfig {
            max_consecutive_persistence_failures: 2,
            ..Default::default()
        },
    )
    .with_health(health.clone());

    let first = scheduler.tick().await.unwrap();
    assert_eq!(first.outcome, TickOutcome::Degraded);
    assert_eq!(first.records_dropped, 1);
    assert_eq!(first.published, 1);
    assert_eq!(
        health.status_of(components::RECORDER).await,
        Some(crate::health::ComponentStatus::Degraded)
    );

    let err = scheduler.tick().await.unwrap_err();
    assert!(matches!(err, MonitorError::PersistenceCeiling { count: 2, .. }));
    assert_eq!(
        health.status_of(components::RECORDER).await,
        Some(crate::health::ComponentStatus::Unhealthy)
    );
}

#[tokio::test]
async fn test_stuck_write_degrades_tick() {
    let harness = Harness::new(ScriptedSource::new(vec![Ok(vec![web_1()]), Ok(vec![web_1()])]));
    let recorder = DurableRecorder::open(
        harness.csv_path(),
        harness.log_path(),
        Duration::from_millis(50),
    )
    .unwrap();
    let stalled = recorder.stall(Duration::from_millis(300));

    let mut scheduler = PollScheduler::new(
        harness.source.clone(),
        recorder,
        LiveViewPublisher::headless(10),
        Scope::Namespace("default".to_string()),
        SchedulerConfig::default(),
    );

    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.outcome, TickOutcome::Degraded);
    assert_eq!(report.records_written, 0);
    assert_eq!(report.records_dropped, 1);
    assert_eq!(report.published, 1);
    stalled.join().unwrap();

    // A timed-out write is abandoned, not cancelled: the row counted as
    // dropped still reaches the CSV once the disk recovers
    let mut rows = 0;
    for _ in 0..100 {
        rows = harness.csv_rows().len();
        if rows >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(rows, 1);

    let recovered = scheduler.tick().await.unwrap();
    assert_eq!(recovered.outcome, TickOutcome::Completed);
    assert_eq!(harness.csv_rows().len(), 2);
}

#[tokio::test]
async fn test_vanished_pod_leaves_live_view() {
    let mut script = vec![Ok(vec![web_1(), entry("batch-1", "job", "10m", Some("1Mi"))])];
    script.extend((0..10).map(|_| Ok(vec![web_1()])));
    let harness = Harness::new(ScriptedSource::new(script));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());
    let batch = SeriesKey {
        namespace: "default".to_string(),
        pod_name: "batch-1".to_string(),
    };

    for _ in 0..10 {
        scheduler.tick().await.unwrap();
    }
    assert!(scheduler.publisher().window(&batch).is_some());

    scheduler.tick().await.unwrap();
    assert!(scheduler.publisher().window(&batch).is_none());
    assert_eq!(scheduler.publisher().series_count(), 1);
}

#[tokio::test]
async fn test_shutdown_before_first_tick_flushes_and_stops() {
    let harness = Harness::new(ScriptedSource::new(vec![Ok(vec![web_1()])]));
    let scheduler = harness.scheduler(SchedulerConfig::default());
    let (tx, rx) = broadcast::channel(1);

    tx.send(()).unwrap();
    scheduler.run(rx).await.unwrap();

    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 0);
    assert!(harness.csv_rows().is_empty());
    let lines = harness.log_lines();
    assert!(lines[0].contains("monitor_started scope=default"));
    assert!(lines.last().unwrap().contains("monitor_stopped reason=\"shutdown requested\""));
}

#[tokio::test]
async fn test_run_ticks_until_shutdown_without_overlap() {
    let source = ScriptedSource::new((0..50).map(|_| Ok(vec![web_1()])).collect()).with_delay(Duration::from_millis(30));
    let harness = Harness::new(source);
    let scheduler = harness.scheduler(SchedulerConfig {
        interval: Duration::from_millis(10),
        ..Default::default()
    });
    let (tx, rx) = broadcast::channel(1);

    let handle = tokio::spawn(scheduler.run(rx));
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let calls = harness.source.calls.load(Ordering::SeqCst);
    assert!(calls >= 2, "expected several ticks, saw {calls}");
    assert_eq!(harness.source.max_in_flight.load(Ordering::SeqCst), 1);

    // Every completed tick wrote its row before the scheduler stopped
    assert_eq!(harness.csv_rows().len(), calls);
}

#[tokio::test]
async fn test_escalation_ends_run_with_error() {
    let denied = || Err(FetchError::Auth("Unauthorized (401)".to_string()));
    let harness = Harness::new(ScriptedSource::new(vec![denied(), denied()]));
    let scheduler = harness.scheduler(SchedulerConfig {
        interval: Duration::from_millis(5),
        max_consecutive_auth_failures: 2,
        ..Default::default()
    });
    let (_tx, rx) = broadcast::channel(1);

    let result = scheduler.run(rx).await;

    assert!(matches!(result, Err(MonitorError::AuthCeiling { .. })));
    let lines = harness.log_lines();
    assert!(lines.last().unwrap().contains("monitor_stopped"));
}

#[test]
fn test_observed_at_strictly_increases() {
    let harness = Harness::new(ScriptedSource::new(vec![]));
    let mut scheduler = harness.scheduler(SchedulerConfig::default());
    let now = Utc::now();

    let a = scheduler.next_observed_at(now);
    let b = scheduler.next_observed_at(now);
    let c = scheduler.next_observed_at(now - chrono::Duration::seconds(5));

    assert!(a < b && b < c);
    assert_eq!(b - a, chrono::Duration::milliseconds(1));
}

#[test]
fn test_reached_ceiling() {
    assert!(!reached(5, 0));
    assert!(!reached(1, 2));
    assert!(reached(2, 2));
}
