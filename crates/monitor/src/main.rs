//! Pod Monitor - Kubernetes pod usage sampler
//!
//! Polls the metrics API on a fixed interval, appends every sample to a CSV
//! file and an audit log, and serves rolling per-pod windows over HTTP.

use anyhow::{Context, Result};
use monitor_lib::{
    health::HealthRegistry,
    observability::{MonitorMetrics, StructuredLogger},
    publisher::{LiveViewPublisher, WatchSink},
    recorder::DurableRecorder,
    scheduler::PollScheduler,
    source::KubeMetricsSource,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pod-monitor");

    let config = config::load()?;
    let scope = config.scope();
    info!(scope = %scope, csv = %config.csv_path.display(), "Monitor configured");

    let source = KubeMetricsSource::connect(config.fetch_timeout())
        .await
        .context("cannot reach the cluster")?;

    let recorder = DurableRecorder::open(&config.csv_path, &config.log_path, config.write_timeout())
        .context("cannot open recorder files")?;

    let (sink, live) = WatchSink::new();
    let publisher = LiveViewPublisher::new(config.window_size, Box::new(sink));

    let health_registry = HealthRegistry::new();
    health_registry.register_pipeline().await;

    let metrics = MonitorMetrics::new();

    let logger = StructuredLogger::new(&scope);
    logger.log_startup(MONITOR_VERSION, config.poll_interval(), config.window_size);

    let scheduler = PollScheduler::from_config(Arc::new(source), recorder, publisher, &config)?
        .with_health(health_registry.clone());

    let app_state = Arc::new(api::AppState::new(health_registry, metrics, live));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => info!(signal, "Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signals"),
        }
        let _ = shutdown_tx.send(());
    });

    let result = scheduler.run(shutdown_rx).await;
    api_handle.abort();

    match result {
        Ok(()) => {
            info!("Shutting down");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Pod monitor stopped");
            Err(e.into())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
