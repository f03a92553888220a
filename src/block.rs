//! Data blocks returned by input stream reads
//!
//! A [`DataBlock`] bundles the samples from a read with the SRI that was in
//! effect, the time stamps that apply to those samples, and the conditions the
//! stream encountered while assembling it. Cloning a block copies its time
//! stamps and flags but aliases the sample storage; writing through
//! [`DataBlock::data_mut`] detaches the clone before modifying anything.

use num_complex::Complex;

use crate::buffer::SharedBuffer;
use crate::types::{
    Element, PrecisionTime, Sample, SampleTimestamp, SharedSri, SriChangeFlags, StreamSri, drift,
};
use crate::{Result, StreamError};

/// Samples, metadata and time stamps from a single read.
#[derive(Debug, Clone)]
pub struct DataBlock<T> {
    buffer: SharedBuffer<T>,
    sri: SharedSri,
    timestamps: Vec<SampleTimestamp>,
    sri_change_flags: SriChangeFlags,
    input_queue_flushed: bool,
}

impl<T: Element> DataBlock<T> {
    /// Create a block with no time stamps and no change flags.
    pub fn new(sri: SharedSri, buffer: SharedBuffer<T>) -> Self {
        Self {
            buffer,
            sri,
            timestamps: Vec::new(),
            sri_change_flags: SriChangeFlags::NONE,
            input_queue_flushed: false,
        }
    }

    /// The SRI in effect for these samples.
    pub fn sri(&self) -> &StreamSri {
        &self.sri
    }

    /// The shared SRI snapshot.
    pub fn shared_sri(&self) -> &SharedSri {
        &self.sri
    }

    /// Sample spacing from the SRI.
    pub fn xdelta(&self) -> f64 {
        self.sri.xdelta
    }

    /// Read-only view of the raw elements.
    pub fn data(&self) -> &[T] {
        self.buffer.as_slice()
    }

    /// Number of raw elements (real values, not complex pairs).
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// The underlying shared buffer.
    pub fn buffer(&self) -> SharedBuffer<T> {
        self.buffer.clone()
    }

    /// Replace the block's buffer.
    pub fn set_buffer(&mut self, buffer: SharedBuffer<T>) {
        self.buffer = buffer;
    }

    /// Add a time stamp, keeping the list ordered by offset.
    ///
    /// A time stamp whose offset equals an existing entry's is placed after it,
    /// so the first one added for an offset stays authoritative.
    pub fn add_timestamp(&mut self, timestamp: SampleTimestamp) {
        let pos = self.timestamps.partition_point(|ts| ts.offset <= timestamp.offset);
        self.timestamps.insert(pos, timestamp);
    }

    /// Copy of the time stamps, ordered by offset.
    pub fn timestamps(&self) -> Vec<SampleTimestamp> {
        self.timestamps.clone()
    }

    /// Time of the first sample.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidState`] if the block has no time stamps or
    /// none at offset 0.
    pub fn start_time(&self) -> Result<PrecisionTime> {
        self.validate_timestamps()?;
        Ok(self.timestamps[0].time)
    }

    /// Drift between the first and last time stamps.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`DataBlock::start_time`].
    pub fn net_time_drift(&self) -> Result<f64> {
        self.validate_timestamps()?;
        let first = &self.timestamps[0];
        let last = &self.timestamps[self.timestamps.len() - 1];
        Ok(drift(first, last, self.xdelta()))
    }

    /// Largest-magnitude drift between consecutive time stamps, keeping its sign.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`DataBlock::start_time`].
    pub fn max_time_drift(&self) -> Result<f64> {
        self.validate_timestamps()?;
        let xdelta = self.xdelta();
        let max = self
            .timestamps
            .windows(2)
            .map(|pair| drift(&pair[0], &pair[1], xdelta))
            .fold(0.0f64, |max, d| if d.abs() > max.abs() { d } else { max });
        Ok(max)
    }

    /// Whether the SRI changed since the previous block on this stream.
    pub fn sri_changed(&self) -> bool {
        !self.sri_change_flags.is_empty()
    }

    /// The SRI fields that changed since the previous block.
    pub fn sri_change_flags(&self) -> SriChangeFlags {
        self.sri_change_flags
    }

    /// Whether the port's input queue was flushed before this data arrived.
    pub fn input_queue_flushed(&self) -> bool {
        self.input_queue_flushed
    }

    pub(crate) fn set_sri_change_flags(&mut self, flags: SriChangeFlags) {
        self.sri_change_flags = flags;
    }

    pub(crate) fn set_input_queue_flushed(&mut self, flushed: bool) {
        self.input_queue_flushed = flushed;
    }

    fn validate_timestamps(&self) -> Result<()> {
        match self.timestamps.first() {
            None => Err(StreamError::invalid_state("block contains no timestamps")),
            Some(first) if first.offset != 0 => {
                Err(StreamError::invalid_state("no timestamp at offset 0"))
            }
            Some(_) => Ok(()),
        }
    }
}

impl<T: Sample> DataBlock<T> {
    /// Allocate a zeroed block of `size` raw elements.
    pub fn with_size(sri: SharedSri, size: usize) -> Self {
        Self::new(sri, SharedBuffer::zeroed(size))
    }

    /// Mutable view of the raw elements; detaches shared storage first.
    pub fn data_mut(&mut self) -> &mut [T] {
        self.buffer.make_mut()
    }

    /// Replace the contents with `count` zeroed elements.
    ///
    /// Existing samples are not preserved, whether the block grows or shrinks.
    pub fn resize(&mut self, count: usize) {
        self.buffer = SharedBuffer::zeroed(count);
    }

    /// Whether the SRI marks the samples as complex.
    pub fn is_complex(&self) -> bool {
        self.sri.is_complex()
    }

    /// Number of complex samples (`size() / 2`).
    pub fn cxsize(&self) -> usize {
        self.size() / 2
    }

    /// The elements reinterpreted as complex pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::PreconditionViolation`] if the element count is odd.
    pub fn cxdata(&self) -> Result<&[Complex<T>]> {
        check_even(self.size())?;
        bytemuck::try_cast_slice(self.data())
            .map_err(|e| StreamError::precondition("cxdata", e.to_string()))
    }

    /// Mutable complex view; detaches shared storage first.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::PreconditionViolation`] if the element count is odd.
    pub fn cxdata_mut(&mut self) -> Result<&mut [Complex<T>]> {
        check_even(self.size())?;
        bytemuck::try_cast_slice_mut(self.data_mut())
            .map_err(|e| StreamError::precondition("cxdata", e.to_string()))
    }

    /// Exchange the block's samples with `other`.
    ///
    /// The block takes ownership of `other`'s elements and `other` receives the
    /// block's previous contents.
    pub fn swap(&mut self, other: &mut Vec<T>) {
        let incoming = SharedBuffer::from_vec(std::mem::take(other));
        let previous = std::mem::replace(&mut self.buffer, incoming);
        *other = previous.to_vec();
    }
}

fn check_even(size: usize) -> Result<()> {
    if size % 2 != 0 {
        return Err(StreamError::precondition(
            "cxdata",
            format!("complex view requires an even element count, got {}", size),
        ));
    }
    Ok(())
}
