//! Packet source trait for upstream producers

use crate::Result;
use crate::buffer::SharedBuffer;
use crate::types::{PrecisionTime, StreamSri};

/// One event produced by a packet source.
#[derive(Debug, Clone)]
pub enum SourceEvent<T> {
    /// Describe (or re-describe) a stream
    Sri(StreamSri),
    /// A packet of samples for a stream
    Data { stream_id: String, data: SharedBuffer<T>, time: PrecisionTime, eos: bool },
}

impl<T> SourceEvent<T> {
    /// The stream this event belongs to.
    pub fn stream_id(&self) -> &str {
        match self {
            SourceEvent::Sri(sri) => &sri.stream_id,
            SourceEvent::Data { stream_id, .. } => stream_id,
        }
    }
}

/// Trait for upstream data sources feeding an input port
///
/// Sources abstract over where packets come from (generators, recordings,
/// network receivers) and handle their own pacing internally. A
/// [`Driver`](crate::driver::Driver) pulls events from a source and pushes
/// them into an [`InPort`](crate::InPort).
#[async_trait::async_trait]
pub trait PacketSource<T>: Send + 'static {
    /// Get the next event
    ///
    /// Returns:
    /// - `Ok(Some(event))` - New event available
    /// - `Ok(None)` - Source exhausted (normal termination)
    /// - `Err(e)` - Error occurred; retryable errors are retried by the driver
    async fn next_event(&mut self) -> Result<Option<SourceEvent<T>>>;
}
