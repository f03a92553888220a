//! Sample-offset time annotations

use serde::{Deserialize, Serialize};

use super::PrecisionTime;

/// A time stamp attached to a specific sample of a data block.
///
/// `offset` counts samples from the start of the block, in complex samples when
/// the block's SRI is complex. A synthetic time stamp was interpolated from an
/// earlier real one rather than received from the producer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleTimestamp {
    pub offset: usize,
    pub time: PrecisionTime,
    pub synthetic: bool,
}

impl SampleTimestamp {
    /// Create a time stamp as received from the producer.
    pub fn new(time: PrecisionTime, offset: usize) -> Self {
        Self { offset, time, synthetic: false }
    }

    /// Create an interpolated time stamp.
    pub fn synthetic(time: PrecisionTime, offset: usize) -> Self {
        Self { offset, time, synthetic: true }
    }
}

/// Drift between two time stamps: the elapsed time minus the time predicted
/// from the sample count and the sample spacing.
pub fn drift(begin: &SampleTimestamp, end: &SampleTimestamp, xdelta: f64) -> f64 {
    let real = end.time - begin.time;
    let expected = (end.offset as f64 - begin.offset as f64) * xdelta;
    real - expected
}
