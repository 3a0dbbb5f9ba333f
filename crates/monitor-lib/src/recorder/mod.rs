//! Durable recording of usage records
//!
//! Every record goes to two sinks: the CSV store (machine-readable, fixed
//! columns) and the audit log (human-readable). `record` returns only after
//! both writes are synced, so an acknowledged record survives a process crash.
//!
//! File I/O runs on tokio's blocking pool behind a mutex, which keeps on-disk
//! order equal to call order. Each write is bounded by `write_timeout`; a write
//! that times out may still land later, after which the next write queues
//! behind it.

mod audit;
mod csv_store;

pub use audit::{render_record, AuditEvent, AuditLog};
pub use csv_store::{CsvStore, CSV_HEADER, CSV_SCHEMA_VERSION};

use crate::error::PersistenceError;
use crate::models::UsageRecord;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

struct Sinks {
    csv: CsvStore,
    audit: AuditLog,
}

/// Append-only recorder over a CSV store and an audit log
pub struct DurableRecorder {
    sinks: Arc<Mutex<Sinks>>,
    write_timeout: Duration,
}

impl DurableRecorder {
    /// Open (or create) both sinks
    pub fn open(
        csv_path: impl AsRef<Path>,
        log_path: impl AsRef<Path>,
        write_timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let csv = CsvStore::open(csv_path)?;
        let audit = AuditLog::open(log_path)?;

        Ok(Self {
            sinks: Arc::new(Mutex::new(Sinks { csv, audit })),
            write_timeout,
        })
    }

    /// Durably append one record
    pub async fn record(&self, record: &UsageRecord) -> Result<(), PersistenceError> {
        let record = record.clone();
        self.with_sinks(move |sinks| {
            sinks.csv.append(&record)?;
            sinks.audit.write_record(&record)
        })
        .await
    }

    /// Append an annotation line to the audit log
    pub async fn annotate(&self, event: AuditEvent) -> Result<(), PersistenceError> {
        self.with_sinks(move |sinks| sinks.audit.write_event(&event))
            .await
    }

    /// Flush and sync both sinks
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        self.with_sinks(|sinks| {
            sinks.csv.sync()?;
            sinks.audit.sync()?;
            debug!(
                csv = %sinks.csv.path().display(),
                rows = sinks.csv.rows_written(),
                "Recorder flushed"
            );
            Ok(())
        })
        .await
    }

    async fn with_sinks<F>(&self, op: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut Sinks) -> Result<(), PersistenceError> + Send + 'static,
    {
        let sinks = Arc::clone(&self.sinks);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = sinks
                .lock()
                .map_err(|_| PersistenceError::Task("recorder lock poisoned".to_string()))?;
            op(&mut guard)
        });

        match tokio::time::timeout(self.write_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(PersistenceError::Task(join_err.to_string())),
            Err(_) => Err(PersistenceError::Timeout(self.write_timeout)),
        }
    }

    /// Hold the sinks from another thread for `duration`, like a stuck disk
    #[cfg(test)]
    pub(crate) fn stall(&self, duration: Duration) -> std::thread::JoinHandle<()> {
        let sinks = Arc::clone(&self.sinks);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let handle = std::thread::spawn(move || {
            let _guard = sinks.lock();
            let _ = locked_tx.send(());
            std::thread::sleep(duration);
        });
        let _ = locked_rx.recv();
        handle
    }
}
