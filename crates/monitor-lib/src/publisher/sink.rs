//! Rendering sinks
//!
//! A sink is whatever draws the live view. The publisher only ever hands it a
//! cloned [`LiveFrame`] and never waits on it.

use super::frame::LiveFrame;
use thiserror::Error;
use tokio::sync::watch;

/// The sink cannot take frames (closed window, no viewers, headless)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("render sink unavailable: {0}")]
pub struct SinkUnavailable(pub String);

/// Accepts a new frame and redraws
pub trait RenderSink: Send + Sync {
    /// Whether a redraw would reach anything right now
    fn is_available(&self) -> bool {
        true
    }

    /// Offer a new frame. Must not block.
    fn redraw(&mut self, frame: &LiveFrame) -> Result<(), SinkUnavailable>;
}

/// Publishes the latest frame on a watch channel
///
/// Viewers hold a [`watch::Receiver`] and read on their own schedule.
pub struct WatchSink {
    tx: watch::Sender<LiveFrame>,
}

impl WatchSink {
    pub fn new() -> (Self, watch::Receiver<LiveFrame>) {
        let (tx, rx) = watch::channel(LiveFrame::default());
        (Self { tx }, rx)
    }

    /// Hand out another viewer handle
    pub fn subscribe(&self) -> watch::Receiver<LiveFrame> {
        self.tx.subscribe()
    }
}

impl RenderSink for WatchSink {
    fn is_available(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    fn redraw(&mut self, frame: &LiveFrame) -> Result<(), SinkUnavailable> {
        self.tx
            .send(frame.clone())
            .map_err(|_| SinkUnavailable("no live view subscribers".to_string()))
    }
}

/// Sink for headless runs
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn is_available(&self) -> bool {
        false
    }

    fn redraw(&mut self, _frame: &LiveFrame) -> Result<(), SinkUnavailable> {
        Err(SinkUnavailable("headless".to_string()))
    }
}
