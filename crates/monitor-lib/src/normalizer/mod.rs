//! Snapshot normalization
//!
//! Turns one raw [`Snapshot`] into [`UsageRecord`]s: CPU in millicores, memory
//! in bytes, all stamped with the tick's observation time.
//!
//! A container whose CPU or memory reading is absent is still emitted, with
//! that metric set to [`Measurement::Unavailable`]. An entry that cannot be
//! attributed (no pod, container or namespace) or carries an unparseable
//! quantity is dropped and reported through [`Normalized::skipped`].

mod quantity;

pub use quantity::{parse_cpu_millicores, parse_memory_bytes};

use crate::error::MalformedDataError;
use crate::models::{Measurement, RawContainerUsage, Scope, Snapshot, UsageRecord};
use chrono::{DateTime, Utc};

/// An entry the normalizer refused to turn into a record
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub pod_name: Option<String>,
    pub container_name: Option<String>,
    pub reason: MalformedDataError,
}

/// Normalize a snapshot taken at `observed_at`
pub fn normalize(snapshot: Snapshot, observed_at: DateTime<Utc>) -> Normalized {
    Normalized {
        scope: snapshot.scope,
        entries: snapshot.entries.into_iter(),
        observed_at,
        skipped: Vec::new(),
    }
}

/// Lazy, single-pass sequence of records for one tick
#[derive(Debug)]
pub struct Normalized {
    scope: Scope,
    entries: std::vec::IntoIter<RawContainerUsage>,
    observed_at: DateTime<Utc>,
    skipped: Vec<SkippedEntry>,
}

impl Normalized {
    /// Entries dropped so far
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Consume the remaining entries, returning the records and every skip
    pub fn collect_with_skips(mut self) -> (Vec<UsageRecord>, Vec<SkippedEntry>) {
        let records: Vec<UsageRecord> = self.by_ref().collect();
        (records, self.skipped)
    }

    fn convert(&self, entry: RawContainerUsage) -> Result<UsageRecord, SkippedEntry> {
        let skip = |reason: MalformedDataError| SkippedEntry {
            pod_name: entry.pod_name.clone(),
            container_name: entry.container_name.clone(),
            reason,
        };

        let pod_name = entry
            .pod_name
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| skip(MalformedDataError::MissingPodName))?;
        let container_name = entry
            .container_name
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| skip(MalformedDataError::MissingContainerName))?;
        let namespace = entry
            .namespace
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.scope.namespace().map(str::to_string))
            .ok_or_else(|| skip(MalformedDataError::MissingNamespace))?;

        let cpu_usage = entry
            .cpu
            .as_deref()
            .map(parse_cpu_millicores)
            .transpose()
            .map_err(&skip)?;
        let memory_usage = entry
            .memory
            .as_deref()
            .map(parse_memory_bytes)
            .transpose()
            .map_err(&skip)?;

        Ok(UsageRecord {
            timestamp: self.observed_at,
            namespace,
            pod_name,
            container_name,
            cpu_usage: Measurement::from(cpu_usage),
            memory_usage: Measurement::from(memory_usage),
        })
    }
}

impl Iterator for Normalized {
    type Item = UsageRecord;

    fn next(&mut self) -> Option<UsageRecord> {
        while let Some(entry) = self.entries.next() {
            match self.convert(entry) {
                Ok(record) => return Some(record),
                Err(skipped) => self.skipped.push(skipped),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entries.len()))
    }
}
