//! Bounded FIFO history for one series

use crate::models::UsageRecord;
use std::collections::VecDeque;

/// The most recent `capacity` ticks of one series, oldest first.
///
/// Records sharing a timestamp belong to the same tick (one per container)
/// and are evicted together, so a pod total is never computed from part of
/// a tick.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    records: VecDeque<UsageRecord>,
    capacity: usize,
    ticks: usize,
}

impl RollingWindow {
    /// Create an empty window; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            ticks: 0,
        }
    }

    /// Append a record, evicting whole oldest ticks beyond capacity
    pub fn push(&mut self, record: UsageRecord) {
        let starts_tick = self
            .records
            .back()
            .map_or(true, |last| last.timestamp != record.timestamp);
        if starts_tick {
            self.ticks += 1;
        }
        self.records.push_back(record);

        while self.ticks > self.capacity {
            self.evict_oldest_tick();
        }
    }

    fn evict_oldest_tick(&mut self) {
        let Some(oldest) = self.records.front().map(|r| r.timestamp) else {
            self.ticks = 0;
            return;
        };
        while self
            .records
            .front()
            .map_or(false, |r| r.timestamp == oldest)
        {
            self.records.pop_front();
        }
        self.ticks -= 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &UsageRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&UsageRecord> {
        self.records.back()
    }

    /// Records held, across all containers
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Distinct ticks held
    pub fn tick_count(&self) -> usize {
        self.ticks
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
