//! Replay source for recorded events

use std::collections::VecDeque;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::Result;
use crate::source::{PacketSource, SourceEvent};
use crate::types::Element;

/// Replay source that plays back a fixed list of events
pub struct ReplaySource<T> {
    events: VecDeque<SourceEvent<T>>,

    /// Event pacing; `None` replays as fast as the port accepts
    interval: Option<Interval>,

    /// Events delivered so far
    position: usize,

    total: usize,
}

impl<T: Element> ReplaySource<T> {
    /// Create an unpaced replay of `events`
    pub fn new(events: impl IntoIterator<Item = SourceEvent<T>>) -> Self {
        let events: VecDeque<_> = events.into_iter().collect();
        let total = events.len();
        info!("Replay source loaded with {} events", total);
        Self { events, interval: None, position: 0, total }
    }

    /// Deliver at most one event per `period`
    ///
    /// Must be called within a tokio runtime.
    pub fn with_pacing(mut self, period: Duration) -> Self {
        let mut pacing = interval(period);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(pacing);
        debug!("Replay pacing set to {:?}", period);
        self
    }

    /// Events not yet delivered
    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Fraction of the recording already delivered, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.total == 0 { 1.0 } else { self.position as f64 / self.total as f64 }
    }
}

#[async_trait::async_trait]
impl<T: Element> PacketSource<T> for ReplaySource<T> {
    async fn next_event(&mut self) -> Result<Option<SourceEvent<T>>> {
        if self.events.is_empty() {
            debug!("Reached end of replay");
            return Ok(None);
        }

        if let Some(pacing) = self.interval.as_mut() {
            pacing.tick().await;
        }

        let event = self.events.pop_front();
        if event.is_some() {
            self.position += 1;
            trace!("Event {}/{}", self.position, self.total);
        }
        Ok(event)
    }
}
