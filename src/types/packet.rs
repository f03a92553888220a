//! Packets queued between a producer and an input stream

use super::{PrecisionTime, SharedSri, SriChangeFlags};
use crate::buffer::SharedBuffer;

/// One unit of data pushed by a producer.
///
/// Packets are queued by the port in arrival order and consumed by the
/// [`InputStream`](crate::InputStream) with the matching stream ID. The
/// payload is reference counted so a whole-packet read can hand it to the
/// reader without copying.
#[derive(Debug, Clone)]
pub struct Packet<T> {
    pub stream_id: String,
    /// Sample data (zero-copy via `Arc`)
    pub buffer: SharedBuffer<T>,
    /// Time of the first sample
    pub time: PrecisionTime,
    /// Last packet of the stream
    pub eos: bool,
    /// SRI in effect for this packet
    pub sri: SharedSri,
    /// Fields that changed since the previous packet's SRI
    pub sri_change_flags: SriChangeFlags,
    /// The port queue was flushed before this packet was queued
    pub input_queue_flushed: bool,
}

impl<T> Packet<T> {
    /// Whether this packet starts a new metadata generation.
    pub fn sri_changed(&self) -> bool {
        !self.sri_change_flags.is_empty()
    }

    /// Whether a read spanning into this packet must stop before it.
    pub fn is_boundary(&self) -> bool {
        self.sri_changed() || self.input_queue_flushed
    }
}
