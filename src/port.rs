//! Input port: stream registry and producer-facing push API
//!
//! An [`InPort`] owns one packet queue shared by every stream it carries and a
//! registry of [`InputStream`]s keyed by stream ID. Producers describe a stream
//! with [`InPort::push_sri`] and feed it with [`InPort::push_packet`];
//! consumers look streams up by ID, wait for whichever stream has data, or
//! subscribe to newly activated streams.
//!
//! ## Stream Lifecycle
//!
//! 1. The first SRI (or packet) for an unknown ID creates a stream. Its first
//!    packet reports every SRI field as changed.
//! 2. Later SRIs for the ID are compared against the previous one; the fields
//!    that differ are flagged on the next packet.
//! 3. An end-of-stream packet closes the producer side. An SRI or packet
//!    arriving for the same ID afterwards starts a new stream. If the old one
//!    has not been read to its end yet, the new stream waits as its pending
//!    successor.
//! 4. Once the reader acknowledges end-of-stream, the old stream leaves the
//!    registry and its successor, if any, becomes active.
//!
//! ## Example
//!
//! ```rust
//! use bulkflow::{InPort, PortConfig, PrecisionTime, StreamSri};
//!
//! let port = InPort::<i16>::with_config(PortConfig::new("dataShort_in").with_max_queue_depth(8));
//! port.start();
//!
//! port.push_sri(StreamSri::new("a"));
//! port.push_packet(vec![1, 2], PrecisionTime::now(), true, "a");
//! // Same ID after end-of-stream: queued behind the first stream
//! port.push_sri(StreamSri::new("a").with_xdelta(0.25));
//! port.push_packet(vec![3], PrecisionTime::now(), false, "a");
//!
//! let first = port.stream("a").unwrap();
//! assert_eq!(first.read().unwrap().data(), &[1, 2]);
//! assert!(first.eos());
//!
//! let second = port.stream("a").unwrap();
//! assert_ne!(first, second);
//! assert_eq!(second.read().unwrap().xdelta(), 0.25);
//! ```

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::buffer::SharedBuffer;
use crate::config::PortConfig;
use crate::queue::{PacketQueue, PushOutcome};
use crate::stream::InputStream;
use crate::types::{Element, Packet, PrecisionTime, SharedSri, SriChangeFlags, StreamSri, compare_sri};

/// Capacity of the new-stream notification channel.
const STREAM_ADDED_CAPACITY: usize = 64;

/// Producer-side view of one stream ID.
struct Producer {
    sri: SharedSri,
    /// Changes since the last packet, attached to the next one
    flags: SriChangeFlags,
}

struct RegistryState<T> {
    producers: HashMap<String, Producer>,
    active: HashMap<String, InputStream<T>>,
    pending: HashMap<String, VecDeque<InputStream<T>>>,
}

/// Streams known to a port.
///
/// Locking order: a stream's own lock may be held while taking the registry
/// lock, never the reverse.
pub(crate) struct Registry<T> {
    state: Mutex<RegistryState<T>>,
    added: broadcast::Sender<InputStream<T>>,
}

impl<T: Element> Registry<T> {
    fn new() -> Self {
        let (added, _) = broadcast::channel(STREAM_ADDED_CAPACITY);
        Self {
            state: Mutex::new(RegistryState {
                producers: HashMap::new(),
                active: HashMap::new(),
                pending: HashMap::new(),
            }),
            added,
        }
    }

    fn stream(&self, stream_id: &str) -> Option<InputStream<T>> {
        self.state.lock().active.get(stream_id).cloned()
    }

    fn streams(&self) -> Vec<InputStream<T>> {
        self.state.lock().active.values().cloned().collect()
    }

    fn announce(&self, stream: &InputStream<T>) {
        // No subscribers is fine
        let _ = self.added.send(stream.clone());
    }

    /// Remove a stream whose end has been acknowledged and promote its
    /// successor.
    pub(crate) fn retire(&self, stream: &InputStream<T>) {
        let promoted = {
            let mut state = self.state.lock();
            let stream_id = stream.stream_id();
            if state.active.get(stream_id) != Some(stream) {
                return;
            }
            state.active.remove(stream_id);

            let next = state.pending.get_mut(stream_id).and_then(VecDeque::pop_front);
            if state.pending.get(stream_id).is_some_and(VecDeque::is_empty) {
                state.pending.remove(stream_id);
            }
            if let Some(next) = &next {
                state.active.insert(stream_id.to_string(), next.clone());
            }
            next
        };

        info!(stream_id = %stream.stream_id(), "Stream retired");
        if let Some(next) = promoted {
            info!(stream_id = %next.stream_id(), "Pending stream promoted");
            self.announce(&next);
        }
    }
}

/// Input port carrying any number of streams of element type `T`.
pub struct InPort<T> {
    config: Mutex<PortConfig>,
    queue: Arc<PacketQueue<T>>,
    registry: Arc<Registry<T>>,
}

impl<T: Element> InPort<T> {
    /// Create a port with default settings. The port starts stopped.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(PortConfig::new(name))
    }

    /// Create a port from a configuration. The port starts stopped.
    pub fn with_config(config: PortConfig) -> Self {
        Self {
            queue: Arc::new(PacketQueue::new(config.max_queue_depth)),
            registry: Arc::new(Registry::new()),
            config: Mutex::new(config),
        }
    }

    pub fn name(&self) -> String {
        self.config.lock().name.clone()
    }

    /// Start delivering packets to readers.
    pub fn start(&self) {
        self.queue.start();
        info!(port = %self.name(), "Port started");
    }

    /// Stop the port. Blocked reads return immediately with no data; queued
    /// packets are kept for a later [`InPort::start`].
    pub fn stop(&self) {
        self.queue.stop();
        info!(port = %self.name(), "Port stopped");
    }

    pub fn is_active(&self) -> bool {
        self.queue.is_active()
    }

    pub fn max_queue_depth(&self) -> usize {
        self.queue.max_depth()
    }

    pub fn set_max_queue_depth(&self, max_queue_depth: usize) {
        self.queue.set_max_depth(max_queue_depth);
        self.config.lock().max_queue_depth = self.queue.max_depth();
    }

    /// Packets currently queued across all streams.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Describe a stream.
    ///
    /// A new stream ID, or one whose previous stream has ended on the producer
    /// side, creates a stream. Otherwise the SRI replaces the stream's current
    /// SRI and the differing fields are flagged on the next packet.
    pub fn push_sri(&self, sri: StreamSri) {
        let sri = Arc::new(sri);
        let mut state = self.registry.state.lock();
        if let Some(producer) = state.producers.get_mut(&sri.stream_id) {
            let changes = compare_sri(&producer.sri, &sri);
            if !changes.is_empty() {
                debug!(stream_id = %sri.stream_id, flags = changes.bits(), "SRI updated");
                producer.flags |= changes;
                producer.sri = sri;
            }
            return;
        }

        let created = self.create_stream(&mut state, sri);
        drop(state);
        if let Some(stream) = created {
            self.registry.announce(&stream);
        }
    }

    /// Queue a packet of samples for `stream_id`.
    ///
    /// Data for an ID with no SRI gets a default SRI. If the queue is full the
    /// call waits for space when any stream's SRI (or the port config) asks
    /// for blocking, and flushes the queue otherwise.
    pub fn push_packet(
        &self,
        data: impl Into<SharedBuffer<T>>,
        time: PrecisionTime,
        eos: bool,
        stream_id: &str,
    ) {
        let buffer = data.into();
        let (packet, blocking, created) = {
            let mut state = self.registry.state.lock();
            let mut created = None;
            if !state.producers.contains_key(stream_id) {
                warn!(stream_id, "Received data for stream without SRI, using defaults");
                created = self.create_stream(&mut state, Arc::new(StreamSri::new(stream_id)));
            }
            let blocking = self.config.lock().default_blocking
                || state.producers.values().any(|p| p.sri.blocking);
            let Some(producer) = state.producers.get_mut(stream_id) else {
                return;
            };

            let packet = Packet {
                stream_id: stream_id.to_string(),
                buffer,
                time,
                eos,
                sri: producer.sri.clone(),
                sri_change_flags: std::mem::take(&mut producer.flags),
                input_queue_flushed: false,
            };
            if eos {
                state.producers.remove(stream_id);
            }
            (packet, blocking, created)
        };

        if let Some(stream) = created {
            self.registry.announce(&stream);
        }
        if self.queue.push(packet, blocking) == PushOutcome::QueuedAfterFlush {
            warn!(port = %self.name(), stream_id, "Queue flushed to make room");
        }
    }

    /// The active stream for `stream_id`.
    pub fn stream(&self, stream_id: &str) -> Option<InputStream<T>> {
        self.registry.stream(stream_id)
    }

    /// All active streams, in no particular order.
    pub fn streams(&self) -> Vec<InputStream<T>> {
        self.registry.streams()
    }

    /// Wait up to `timeout` for a stream that has data to read.
    ///
    /// Streams already holding partially read data are preferred; otherwise
    /// the stream of the oldest queued packet is returned. `None` timeout
    /// waits indefinitely. Returns `None` on timeout or when the port stops.
    pub fn current_stream(&self, timeout: Option<Duration>) -> Option<InputStream<T>> {
        // Stream locks are taken outside the registry lock
        let streams = self.registry.streams();
        if let Some(stream) = streams.into_iter().find(|s| s.has_buffered_data()) {
            return Some(stream);
        }
        let stream_id = self.queue.wait_for_any(timeout)?;
        self.registry.stream(&stream_id)
    }

    /// Newly activated streams, including promoted pending streams.
    ///
    /// Only streams activated after subscribing are yielded. A subscriber that
    /// falls far behind skips the notifications it missed.
    pub fn stream_added(&self) -> impl Stream<Item = InputStream<T>> + Send + 'static {
        BroadcastStream::new(self.registry.added.subscribe())
            .filter_map(|event| futures::future::ready(event.ok()))
    }

    fn create_stream(
        &self,
        state: &mut RegistryState<T>,
        sri: SharedSri,
    ) -> Option<InputStream<T>> {
        let stream_id = sri.stream_id.clone();
        state.producers.insert(
            stream_id.clone(),
            Producer { sri: sri.clone(), flags: SriChangeFlags::ALL },
        );

        let stream =
            InputStream::new(sri, Arc::clone(&self.queue), Arc::downgrade(&self.registry));
        if state.active.contains_key(&stream_id) {
            debug!(stream_id = %stream_id, "Stream pending until previous stream ends");
            state.pending.entry(stream_id).or_default().push_back(stream);
            None
        } else {
            info!(stream_id = %stream_id, "Stream created");
            state.active.insert(stream_id, stream.clone());
            Some(stream)
        }
    }
}

impl<T> std::fmt::Debug for InPort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InPort").field("config", &*self.config.lock()).finish()
    }
}
