//! Human-readable audit log
//!
//! One line per record, tick or error event:
//! `<rfc3339> <LEVEL> <event> key=value ...`

use crate::error::PersistenceError;
use crate::models::{Scope, UsageRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Events annotated alongside the records
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    Started {
        scope: Scope,
        interval: Duration,
    },
    Stopped {
        reason: String,
    },
    /// The fetch for a tick failed; nothing was recorded
    FetchFailed {
        tick: u64,
        scope: Scope,
        observed_at: DateTime<Utc>,
        kind: &'static str,
        error: String,
    },
    /// The normalizer dropped an entry
    EntrySkipped {
        tick: u64,
        observed_at: DateTime<Utc>,
        pod_name: Option<String>,
        container_name: Option<String>,
        reason: String,
    },
    /// Some records of a tick could not be persisted
    TickDegraded {
        tick: u64,
        observed_at: DateTime<Utc>,
        written: usize,
        dropped: usize,
        error: String,
    },
    TickCompleted {
        tick: u64,
        observed_at: DateTime<Utc>,
        records: usize,
        skipped: usize,
    },
}

impl AuditEvent {
    fn level(&self) -> &'static str {
        match self {
            AuditEvent::Started { .. }
            | AuditEvent::Stopped { .. }
            | AuditEvent::TickCompleted { .. } => "INFO",
            AuditEvent::EntrySkipped { .. } => "WARN",
            AuditEvent::FetchFailed { .. } | AuditEvent::TickDegraded { .. } => "ERROR",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AuditEvent::Started { .. } => "monitor_started",
            AuditEvent::Stopped { .. } => "monitor_stopped",
            AuditEvent::FetchFailed { .. } => "fetch_failed",
            AuditEvent::EntrySkipped { .. } => "entry_skipped",
            AuditEvent::TickDegraded { .. } => "tick_degraded",
            AuditEvent::TickCompleted { .. } => "tick_completed",
        }
    }

    fn observed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AuditEvent::Started { .. } | AuditEvent::Stopped { .. } => None,
            AuditEvent::FetchFailed { observed_at, .. }
            | AuditEvent::EntrySkipped { observed_at, .. }
            | AuditEvent::TickDegraded { observed_at, .. }
            | AuditEvent::TickCompleted { observed_at, .. } => Some(*observed_at),
        }
    }

    /// Render the event as one log line, without the trailing newline
    pub fn render(&self) -> String {
        let at = self.observed_at().unwrap_or_else(Utc::now);
        let mut line = format!(
            "{} {:<5} {}",
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level(),
            self.name()
        );

        // Writing into a String cannot fail
        let _ = match self {
            AuditEvent::Started { scope, interval } => {
                write!(line, " scope={scope} interval_secs={}", interval.as_secs())
            }
            AuditEvent::Stopped { reason } => write!(line, " reason={reason:?}"),
            AuditEvent::FetchFailed {
                tick,
                scope,
                kind,
                error,
                ..
            } => write!(line, " tick={tick} scope={scope} kind={kind} error={error:?}"),
            AuditEvent::EntrySkipped {
                tick,
                pod_name,
                container_name,
                reason,
                ..
            } => write!(
                line,
                " tick={tick} pod={} container={} kind=malformed_data reason={reason:?}",
                pod_name.as_deref().unwrap_or("-"),
                container_name.as_deref().unwrap_or("-"),
            ),
            AuditEvent::TickDegraded {
                tick,
                written,
                dropped,
                error,
                ..
            } => write!(
                line,
                " tick={tick} written={written} dropped={dropped} kind=persistence error={error:?}"
            ),
            AuditEvent::TickCompleted {
                tick,
                records,
                skipped,
                ..
            } => write!(line, " tick={tick} records={records} skipped={skipped}"),
        };

        line
    }
}

/// Render a record line
pub fn render_record(record: &UsageRecord) -> String {
    format!(
        "{} INFO  record namespace={} pod={} container={} cpu_millicores={} memory_bytes={}",
        record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.namespace,
        record.pod_name,
        record.container_name,
        record.cpu_usage,
        record.memory_usage,
    )
}

/// Append-only audit log file
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;

        Ok(Self { path, file })
    }

    pub fn write_record(&mut self, record: &UsageRecord) -> Result<(), PersistenceError> {
        self.write_line(&render_record(record))
    }

    pub fn write_event(&mut self, event: &AuditEvent) -> Result<(), PersistenceError> {
        self.write_line(&event.render())
    }

    /// Write one complete line in a single call and sync it
    fn write_line(&mut self, line: &str) -> Result<(), PersistenceError> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        self.file
            .write_all(buf.as_bytes())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| PersistenceError::io(&self.path, e))
    }

    pub fn sync(&mut self) -> Result<(), PersistenceError> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_all())
            .map_err(|e| PersistenceError::io(&self.path, e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
