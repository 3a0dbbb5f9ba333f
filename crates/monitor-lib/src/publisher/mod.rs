//! Live view publishing
//!
//! Keeps a [`RollingWindow`] per pod and offers a fresh [`LiveFrame`] to the
//! render sink after every record. Publishing never fails and never blocks the
//! recording path: an unavailable sink just means windows are updated without
//! a redraw.

mod frame;
mod sink;
mod window;

pub use frame::{LiveFrame, MetricKind, MetricPoint, MetricSeries, SeriesFrame};
pub use sink::{NullSink, RenderSink, SinkUnavailable, WatchSink};
pub use window::RollingWindow;

use crate::models::{SeriesKey, UsageRecord};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Owns the rolling windows and the render sink
pub struct LiveViewPublisher {
    series: BTreeMap<SeriesKey, Series>,
    window_size: usize,
    sink: Box<dyn RenderSink>,
    sink_available: bool,
    redraws: u64,
    tick: u64,
}

/// A window plus the tick that last fed it
struct Series {
    window: RollingWindow,
    last_tick: u64,
}

impl LiveViewPublisher {
    pub fn new(window_size: usize, sink: Box<dyn RenderSink>) -> Self {
        Self {
            series: BTreeMap::new(),
            window_size,
            sink,
            sink_available: true,
            redraws: 0,
            tick: 0,
        }
    }

    /// Publisher without a display
    pub fn headless(window_size: usize) -> Self {
        Self::new(window_size, Box::new(NullSink))
    }

    /// Add a record to its series and redraw if anything is listening
    pub fn publish(&mut self, record: &UsageRecord) {
        let (window_size, tick) = (self.window_size, self.tick);
        let series = self
            .series
            .entry(record.series_key())
            .or_insert_with(|| Series {
                window: RollingWindow::new(window_size),
                last_tick: tick,
            });
        series.window.push(record.clone());
        series.last_tick = tick;

        self.redraw();
    }

    /// Close the current tick.
    ///
    /// A series that received no record for `window_size` consecutive ticks
    /// is dropped, and viewers are redrawn without it. Returns how many
    /// series were dropped.
    pub fn end_tick(&mut self) -> usize {
        let (tick, horizon) = (self.tick, self.window_size.max(1) as u64);
        let before = self.series.len();
        self.series
            .retain(|_, series| tick - series.last_tick < horizon);
        let pruned = before - self.series.len();

        if pruned > 0 {
            debug!(pruned, remaining = self.series.len(), "Dropped stale live view series");
            self.redraw();
        }
        self.tick += 1;
        pruned
    }

    fn redraw(&mut self) {
        if !self.sink.is_available() {
            self.mark_unavailable("sink reports no viewers");
            return;
        }

        let frame = self.frame();
        match self.sink.redraw(&frame) {
            Ok(()) => {
                if !self.sink_available {
                    info!("Live view sink available again, resuming redraws");
                    self.sink_available = true;
                }
                self.redraws += 1;
            }
            Err(e) => self.mark_unavailable(&e.to_string()),
        }
    }

    fn mark_unavailable(&mut self, reason: &str) {
        if self.sink_available {
            info!(reason = %reason, "Live view sink unavailable, publishing without redraw");
            self.sink_available = false;
        } else {
            debug!(reason = %reason, "Skipping live view redraw");
        }
    }

    /// Snapshot every window, series ordered by namespace then pod
    pub fn frame(&self) -> LiveFrame {
        LiveFrame {
            generated_at: Some(Utc::now()),
            series: self
                .series
                .iter()
                .map(|(key, series)| SeriesFrame {
                    namespace: key.namespace.clone(),
                    pod_name: key.pod_name.clone(),
                    records: series.window.iter().cloned().collect(),
                })
                .collect(),
        }
    }

    pub fn window(&self, key: &SeriesKey) -> Option<&RollingWindow> {
        self.series.get(key).map(|series| &series.window)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn is_sink_available(&self) -> bool {
        self.sink_available
    }

    /// Frames delivered to the sink so far
    pub fn redraws(&self) -> u64 {
        self.redraws
    }
}
