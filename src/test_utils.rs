//! Shared fixtures for tests and benchmarks
//!
//! Helpers for building ports pre-loaded with packets, so tests can focus on
//! what a reader observes rather than on producer bookkeeping.

#![cfg(any(test, feature = "benchmark"))]

use crate::config::PortConfig;
use crate::port::InPort;
use crate::types::{Element, PrecisionTime, StreamSri};

/// Queue depth used by fixture ports; large enough that tests never flush by
/// accident.
pub const FIXTURE_QUEUE_DEPTH: usize = 1024;

/// Sample spacing of fixture streams.
pub const FIXTURE_XDELTA: f64 = 0.5;

/// A started port with a generous queue.
pub fn started_port<T: Element>() -> InPort<T> {
    let port = InPort::with_config(
        PortConfig::new("fixture_in").with_max_queue_depth(FIXTURE_QUEUE_DEPTH),
    );
    port.start();
    port
}

/// SRI for a fixture stream with [`FIXTURE_XDELTA`] spacing.
pub fn fixture_sri(stream_id: &str) -> StreamSri {
    StreamSri::new(stream_id).with_xdelta(FIXTURE_XDELTA)
}

/// Time of the first sample of packet `index` when every packet holds
/// `packet_len` samples at [`FIXTURE_XDELTA`] spacing, starting at 100 s.
pub fn packet_time(index: usize, packet_len: usize) -> PrecisionTime {
    PrecisionTime::new(100.0, 0.0) + (index * packet_len) as f64 * FIXTURE_XDELTA
}

/// Push `packets` consecutive packets of `packet_len` samples with values
/// counting up from 0, marking the last one end-of-stream if `eos` is set.
pub fn push_ramp(port: &InPort<f32>, stream_id: &str, packets: usize, packet_len: usize, eos: bool) {
    port.push_sri(fixture_sri(stream_id));
    for index in 0..packets {
        let start = index * packet_len;
        let data: Vec<f32> = (start..start + packet_len).map(|v| v as f32).collect();
        let last = eos && index + 1 == packets;
        port.push_packet(data, packet_time(index, packet_len), last, stream_id);
    }
}

/// The values [`push_ramp`] produces for samples `range`.
pub fn ramp(range: std::ops::Range<usize>) -> Vec<f32> {
    range.map(|v| v as f32).collect()
}

/// Install a test log subscriber; repeated calls are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
