//! Buffered input streams
//!
//! An [`InputStream`] gives a file-like view of one stream ID on an
//! [`InPort`](crate::InPort). Producers push packets of whatever size suits
//! them; the stream re-slices them into the block sizes the reader asks for,
//! carries time stamps across packet boundaries, and stops short whenever the
//! metadata changes, the port queue was flushed, or the stream ends.
//!
//! ## Reading
//!
//! - [`InputStream::read`] returns the next packet as-is, without copying
//! - [`InputStream::read_count`] returns exactly `count` samples unless a
//!   boundary intervenes
//! - [`InputStream::read_overlap`] additionally keeps the last
//!   `count - consume` samples for the next read
//! - [`InputStream::skip`] discards samples without building a block
//! - the `try_` variants never wait for data
//!
//! When the SRI marks the stream as complex, every count and every returned
//! size is in complex samples.
//!
//! ## End of Stream
//!
//! Once a read returns `None` because the stream ended, or [`InputStream::eos`]
//! returns `true`, the stream is retired from its port and a pending stream
//! with the same ID, if any, becomes active. Handles are cheap to clone and all
//! clones refer to the same stream.
//!
//! ```rust
//! use bulkflow::{InPort, StreamSri, PrecisionTime};
//!
//! let port = InPort::<f32>::new("dataFloat_in");
//! port.start();
//! port.push_sri(StreamSri::new("rx").with_xdelta(0.5));
//! port.push_packet(vec![1.0, 2.0, 3.0], PrecisionTime::new(10.0, 0.0), false, "rx");
//! port.push_packet(vec![4.0, 5.0], PrecisionTime::new(11.5, 0.0), true, "rx");
//!
//! let stream = port.stream("rx").unwrap();
//! let block = stream.read_count(4).unwrap();
//! assert_eq!(block.data(), &[1.0, 2.0, 3.0, 4.0]);
//! assert_eq!(block.timestamps().len(), 2);
//!
//! let tail = stream.read_count(4).unwrap();
//! assert_eq!(tail.data(), &[5.0]);
//! assert!(tail.timestamps()[0].synthetic);
//!
//! assert!(stream.eos());
//! assert!(port.stream("rx").is_none());
//! ```

mod cursor;
#[cfg(test)]
mod tests;

use futures::Stream;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::block::DataBlock;
use crate::port::Registry;
use crate::queue::PacketQueue;
use crate::types::{Element, SharedSri, elements_per_sample};
use crate::{Result, StreamError};
use cursor::{Cursor, Fetch};

/// Lifecycle state of an input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting and delivering data
    Active,
    /// All data up to the end-of-stream marker has been consumed
    EndOfStream,
    /// Data for this stream is being discarded
    Disabled,
    /// End-of-stream was acknowledged and the stream left its port
    Closed,
}

struct StreamInner<T> {
    stream_id: String,
    sri: RwLock<SharedSri>,
    enabled: AtomicBool,
    cursor: Mutex<Cursor<T>>,
    queue: Arc<PacketQueue<T>>,
    registry: Weak<Registry<T>>,
}

/// Handle to a stream of typed samples arriving on an input port.
pub struct InputStream<T> {
    inner: Arc<StreamInner<T>>,
}

impl<T> Clone for InputStream<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> PartialEq for InputStream<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for InputStream<T> {}

impl<T> std::fmt::Debug for InputStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream").field("stream_id", &self.inner.stream_id).finish()
    }
}

impl<T: Element> InputStream<T> {
    pub(crate) fn new(
        sri: SharedSri,
        queue: Arc<PacketQueue<T>>,
        registry: Weak<Registry<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                stream_id: sri.stream_id.clone(),
                sri: RwLock::new(sri),
                enabled: AtomicBool::new(true),
                cursor: Mutex::new(Cursor::new()),
                queue,
                registry,
            }),
        }
    }

    /// The immutable stream ID.
    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    /// The SRI in effect for the most recent read.
    pub fn sri(&self) -> SharedSri {
        self.inner.sri.read().clone()
    }

    /// Current lifecycle state, without side effects.
    pub fn state(&self) -> StreamState {
        let cursor = self.inner.cursor.lock();
        if cursor.closed {
            StreamState::Closed
        } else if cursor.eos_reached {
            StreamState::EndOfStream
        } else if !self.enabled() {
            StreamState::Disabled
        } else {
            StreamState::Active
        }
    }

    /// Whether the stream has ended.
    ///
    /// Returns `true` once all data up to the end-of-stream marker has been
    /// consumed, or when the only thing left for the stream is an empty
    /// end-of-stream packet. A `true` result acknowledges the end: the stream
    /// is retired from its port.
    pub fn eos(&self) -> bool {
        let mut cursor = self.inner.cursor.lock();
        if cursor.closed {
            return true;
        }
        if !cursor.eos_reached {
            if !cursor.has_data() {
                cursor.fetch(&self.inner.queue, &self.inner.stream_id);
            }
            if cursor.queued() == 0 && cursor.holds_eos() {
                cursor.consume(0);
            }
        }
        if cursor.eos_reached {
            self.close(&mut cursor);
            return true;
        }
        false
    }

    /// Blocking read of the next packet's worth of data.
    ///
    /// The packet's buffer is passed through without copying unless part of it
    /// was already consumed. Returns `None` once the stream has ended or the
    /// port is stopped.
    pub fn read(&self) -> Option<DataBlock<T>> {
        self.read_packet(true)
    }

    /// Non-blocking [`InputStream::read`]; `None` if no packet is queued.
    pub fn try_read(&self) -> Option<DataBlock<T>> {
        self.read_packet(false)
    }

    /// Blocking read of `count` samples.
    ///
    /// Returns fewer samples if an SRI change, queue flush or end-of-stream
    /// comes first; the next read starts at the packet that caused it.
    /// Returns `None` once the stream has ended or the port is stopped.
    pub fn read_count(&self, count: usize) -> Option<DataBlock<T>> {
        self.read_sized(count, count, true)
    }

    /// Non-blocking [`InputStream::read_count`]; `None` if `count` samples are
    /// not available yet and nothing would cut the read short.
    pub fn try_read_count(&self, count: usize) -> Option<DataBlock<T>> {
        self.read_sized(count, count, false)
    }

    /// Blocking read of `count` samples that only consumes `consume` of them.
    ///
    /// The remaining `count - consume` samples start the next read. If the
    /// read is cut short by an SRI change, queue flush or end-of-stream, every
    /// returned sample is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::PreconditionViolation`] if `consume > count`.
    pub fn read_overlap(&self, count: usize, consume: usize) -> Result<Option<DataBlock<T>>> {
        check_overlap(count, consume)?;
        Ok(self.read_sized(count, consume, true))
    }

    /// Non-blocking [`InputStream::read_overlap`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::PreconditionViolation`] if `consume > count`.
    pub fn try_read_overlap(&self, count: usize, consume: usize) -> Result<Option<DataBlock<T>>> {
        check_overlap(count, consume)?;
        Ok(self.read_sized(count, consume, false))
    }

    /// Discard up to `count` samples, blocking until they are available.
    ///
    /// Stops at the same boundaries as [`InputStream::read_count`]. Returns the
    /// number of samples skipped; 0 once the stream has ended or the port is
    /// stopped.
    pub fn skip(&self, count: usize) -> usize {
        self.attempt(true, 0, |cursor| {
            if !self.readable(cursor) {
                return Step::Done(0);
            }
            let primed = self.prime(cursor);
            if primed != Fetch::Fetched {
                return stalled(primed);
            }

            let factor = cursor.factor();
            let want = count.saturating_mul(factor);
            let gathered = match cursor.gather(&self.inner.queue, &self.inner.stream_id, want) {
                Ok(gathered) => gathered,
                Err(failed) => return stalled(failed),
            };
            if gathered.available == 0 {
                self.finish_if_ended(cursor);
                return Step::Done(0);
            }

            if let Some(sri) = cursor.front_sri().cloned() {
                *self.inner.sri.write() = sri;
            }
            cursor.clear_front_flags();
            cursor.consume(gathered.available);
            Step::Done(gathered.available / factor)
        })
    }

    /// Whether packets for this stream are queued and delivered.
    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Resume queuing packets for this stream.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Release);
        self.inner.queue.enable(&self.inner.stream_id);
        info!(stream_id = %self.inner.stream_id, "Stream enabled");
    }

    /// Stop delivering data for this stream.
    ///
    /// Queued and buffered data is discarded, and data packets arriving for
    /// this stream are dropped until its end-of-stream packet arrives. Reads
    /// on a disabled stream return `None`.
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Release);
        let mut cursor = self.inner.cursor.lock();
        cursor.discard();
        self.inner.queue.discard(&self.inner.stream_id);
        info!(stream_id = %self.inner.stream_id, "Stream disabled");
    }

    /// Estimate of the samples that can be read without waiting.
    ///
    /// Counts buffered data plus queued packets up to the first SRI change or
    /// queue flush, since no read can span those.
    ///
    /// The estimate is advisory: if the port queue flushes between this call
    /// and a read, a blocking read may wait and a `try_` read may return
    /// `None`. Callers must tolerate this.
    pub fn samples_available(&self) -> usize {
        let cursor = self.inner.cursor.lock();
        if cursor.closed || cursor.eos_reached {
            return 0;
        }
        let mut samples = cursor.queued() / cursor.factor();
        if cursor.holds_eos() {
            return samples;
        }
        let mut joining = cursor.has_data();
        self.inner.queue.scan(&self.inner.stream_id, |packet| {
            if joining && packet.is_boundary() {
                return false;
            }
            let factor = elements_per_sample::<T>(packet.sri.is_complex());
            samples += packet.buffer.len() / factor;
            joining = true;
            !packet.eos
        });
        samples
    }

    /// Whether [`InputStream::samples_available`] is non-zero. Equally advisory.
    pub fn ready(&self) -> bool {
        self.samples_available() > 0
    }

    /// Async stream of blocks of `count` samples, ending with the stream.
    ///
    /// Each read runs on tokio's blocking pool.
    pub fn blocks(&self, count: usize) -> impl Stream<Item = DataBlock<T>> + Send + 'static {
        futures::stream::unfold(self.clone(), move |stream| async move {
            let reader = stream.clone();
            let block =
                tokio::task::spawn_blocking(move || reader.read_count(count)).await.ok().flatten()?;
            Some((block, stream))
        })
    }

    /// Whether the stream holds data pulled from the port queue.
    ///
    /// Never waits: a stream whose cursor is busy reports `false`.
    pub(crate) fn has_buffered_data(&self) -> bool {
        self.inner.cursor.try_lock().is_some_and(|cursor| cursor.has_data())
    }

    /// Run `step` with the cursor locked until it produces a result.
    ///
    /// Between attempts the cursor is unlocked while waiting for the port
    /// queue, so queries on other handles are not held up by a blocked read.
    /// Returns `idle` when a non-blocking attempt finds nothing or the port
    /// stops.
    fn attempt<R>(
        &self,
        blocking: bool,
        idle: R,
        mut step: impl FnMut(&mut MutexGuard<'_, Cursor<T>>) -> Step<R>,
    ) -> R {
        loop {
            {
                let mut cursor = self.inner.cursor.lock();
                if let Step::Done(result) = step(&mut cursor) {
                    return result;
                }
            }
            if !blocking || !self.inner.queue.wait_for(&self.inner.stream_id) {
                return idle;
            }
        }
    }

    fn read_packet(&self, blocking: bool) -> Option<DataBlock<T>> {
        self.attempt(blocking, None, |cursor| {
            if !self.readable(cursor) {
                return Step::Done(None);
            }
            let primed = self.prime(cursor);
            if primed != Fetch::Fetched {
                return stalled(primed);
            }

            let available = cursor.front_remaining();
            if available == 0 {
                self.finish_if_ended(cursor);
                return Step::Done(None);
            }
            Step::Done(self.take_block(cursor, available, available))
        })
    }

    fn read_sized(&self, count: usize, consume: usize, blocking: bool) -> Option<DataBlock<T>> {
        self.attempt(blocking, None, |cursor| {
            if !self.readable(cursor) {
                return Step::Done(None);
            }
            let primed = self.prime(cursor);
            if primed != Fetch::Fetched {
                return stalled(primed);
            }

            let factor = cursor.factor();
            let want = count.saturating_mul(factor);
            let gathered = match cursor.gather(&self.inner.queue, &self.inner.stream_id, want) {
                Ok(gathered) => gathered,
                Err(failed) => return stalled(failed),
            };
            if gathered.available == 0 {
                self.finish_if_ended(cursor);
                if cursor.closed {
                    return Step::Done(None);
                }
                return Step::Done(self.take_block(cursor, 0, 0));
            }

            let consumed = if gathered.truncated {
                gathered.available
            } else {
                consume.saturating_mul(factor)
            };
            Step::Done(self.take_block(cursor, gathered.available, consumed))
        })
    }

    /// Whether a read may proceed; acknowledges a reached end-of-stream.
    fn readable(&self, cursor: &mut MutexGuard<'_, Cursor<T>>) -> bool {
        if cursor.closed || !self.enabled() {
            return false;
        }
        if cursor.eos_reached {
            self.close(cursor);
            return false;
        }
        true
    }

    /// Make sure the cursor holds at least one packet.
    fn prime(&self, cursor: &mut MutexGuard<'_, Cursor<T>>) -> Fetch {
        if cursor.has_data() {
            return Fetch::Fetched;
        }
        cursor.fetch(&self.inner.queue, &self.inner.stream_id)
    }

    fn take_block(
        &self,
        cursor: &mut MutexGuard<'_, Cursor<T>>,
        count: usize,
        consume: usize,
    ) -> Option<DataBlock<T>> {
        let block = cursor.assemble(count)?;
        *self.inner.sri.write() = block.shared_sri().clone();
        cursor.consume(consume);
        Some(block)
    }

    /// A read found nothing to return; if that is because the stream ended,
    /// consume the end marker and retire the stream.
    fn finish_if_ended(&self, cursor: &mut MutexGuard<'_, Cursor<T>>) {
        if cursor.queued() == 0 && cursor.holds_eos() {
            cursor.consume(0);
        }
        if cursor.eos_reached {
            self.close(cursor);
        }
    }

    fn close(&self, cursor: &mut MutexGuard<'_, Cursor<T>>) {
        if cursor.closed {
            return;
        }
        cursor.closed = true;
        debug!(stream_id = %self.inner.stream_id, "End of stream acknowledged");
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.retire(self);
        }
    }
}

/// One locked attempt at a read.
enum Step<R> {
    Done(R),
    /// Nothing to return until more data is queued
    Pending,
}

/// Map a fetch that produced no data to the read's outcome.
fn stalled<R: Default>(fetch: Fetch) -> Step<R> {
    match fetch {
        Fetch::Empty => Step::Pending,
        _ => Step::Done(R::default()),
    }
}

fn check_overlap(count: usize, consume: usize) -> Result<()> {
    if consume > count {
        return Err(StreamError::precondition(
            "read_overlap",
            format!("consume ({}) exceeds count ({})", consume, count),
        ));
    }
    Ok(())
}
