//! Bounded packet queue shared by a port's producers and its input streams
//!
//! The queue is the only state touched by both the producer side
//! ([`InPort::push_packet`](crate::InPort::push_packet)) and the consumer side
//! (the read methods of [`InputStream`](crate::InputStream)). A single mutex
//! guards it; two condition variables signal "a packet arrived or the queue
//! stopped" and "space became available or the queue stopped". Every wait
//! re-checks its condition in a loop, so spurious wake-ups are harmless.
//!
//! Packets for all streams share one ordered queue and one depth limit. When
//! the queue is full, a non-blocking producer flushes it: queued data packets
//! are dropped, end-of-stream packets survive, and the next packet of every
//! affected stream is marked with `input_queue_flushed`.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::buffer::SharedBuffer;
use crate::types::{Element, Packet, SriChangeFlags};

/// Outcome of a receive attempt.
#[derive(Debug)]
pub enum Next<T> {
    /// A packet for the stream was removed from the queue.
    Packet(Packet<T>),
    /// The next packet for the stream was rejected by the caller's filter and
    /// left in the queue.
    Refused,
    /// No packet for the stream is queued (non-blocking receive only).
    Empty,
    /// The queue has been stopped.
    Stopped,
}

/// Outcome of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after flushing the existing contents.
    QueuedAfterFlush,
    /// Dropped because its stream is disabled.
    Dropped,
}

struct QueueState<T> {
    packets: VecDeque<Packet<T>>,
    max_depth: usize,
    active: bool,
    disabled: HashSet<String>,
    /// Streams that lost packets to a flush and have not been told yet
    flushed: HashSet<String>,
    /// SRI change flags of dropped packets, owed to each stream's next packet
    owed_flags: HashMap<String, SriChangeFlags>,
}

/// Bounded, ordered packet queue with blocking and non-blocking receive.
pub struct PacketQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T: Element> PacketQueue<T> {
    /// Create a stopped queue holding at most `max_depth` packets.
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                max_depth: max_depth.max(1),
                active: false,
                disabled: HashSet::new(),
                flushed: HashSet::new(),
                owed_flags: HashMap::new(),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Allow receives to return packets.
    pub fn start(&self) {
        self.state.lock().active = true;
    }

    /// Stop the queue, waking every blocked producer and consumer.
    ///
    /// Blocked and future receives return [`Next::Stopped`] until
    /// [`PacketQueue::start`] is called again. Queued packets are kept.
    pub fn stop(&self) {
        self.state.lock().active = false;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Number of queued packets across all streams.
    pub fn len(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn max_depth(&self) -> usize {
        self.state.lock().max_depth
    }

    /// Change the depth limit. Values below 1 are raised to 1.
    pub fn set_max_depth(&self, max_depth: usize) {
        self.state.lock().max_depth = max_depth.max(1);
        self.not_full.notify_all();
    }

    /// Queue a packet.
    ///
    /// If the queue is full and `blocking` is set, waits for space (or for the
    /// queue to stop); otherwise flushes the queue first.
    pub fn push(&self, mut packet: Packet<T>, blocking: bool) -> PushOutcome {
        let mut state = self.state.lock();

        if state.disabled.contains(&packet.stream_id) {
            if !packet.eos {
                trace!(stream_id = %packet.stream_id, "Dropping packet for disabled stream");
                *state.owed_flags.entry(packet.stream_id).or_default() |= packet.sri_change_flags;
                return PushOutcome::Dropped;
            }
            // The end marker is still delivered so the stream can finish
            state.disabled.remove(&packet.stream_id);
            packet.buffer = SharedBuffer::empty();
        }

        let mut outcome = PushOutcome::Queued;
        if state.packets.len() >= state.max_depth {
            if blocking {
                while state.active && state.packets.len() >= state.max_depth {
                    self.not_full.wait(&mut state);
                }
            }
            if state.packets.len() >= state.max_depth {
                Self::flush(&mut state);
                state.flushed.insert(packet.stream_id.clone());
                outcome = PushOutcome::QueuedAfterFlush;
            }
        }

        Self::settle_debts(&mut state, &mut packet);
        state.packets.push_back(packet);
        drop(state);

        self.not_empty.notify_all();
        outcome
    }

    /// Remove the next packet for `stream_id` if `accept` approves it.
    ///
    /// Never waits. A packet rejected by `accept` stays at its position.
    pub fn next(&self, stream_id: &str, accept: impl Fn(&Packet<T>) -> bool) -> Next<T> {
        let mut state = self.state.lock();
        if !state.active {
            return Next::Stopped;
        }
        let Some(index) = state.packets.iter().position(|p| p.stream_id == stream_id) else {
            return Next::Empty;
        };
        if !accept(&state.packets[index]) {
            return Next::Refused;
        }
        let packet = state.packets.remove(index);
        drop(state);
        self.not_full.notify_all();
        match packet {
            Some(packet) => Next::Packet(packet),
            None => Next::Empty,
        }
    }

    /// Block until a packet for `stream_id` is queued, the stream's data is
    /// being dropped, or the queue stops.
    ///
    /// Returns `false` if the queue is stopped. A `true` result is only a
    /// hint: another reader may take the packet first.
    pub fn wait_for(&self, stream_id: &str) -> bool {
        let mut state = self.state.lock();
        loop {
            if !state.active {
                return false;
            }
            if state.disabled.contains(stream_id)
                || state.packets.iter().any(|p| p.stream_id == stream_id)
            {
                return true;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Visit the queued packets for `stream_id` in order until `visit` returns
    /// `false`.
    pub fn scan(&self, stream_id: &str, mut visit: impl FnMut(&Packet<T>) -> bool) {
        let state = self.state.lock();
        for packet in state.packets.iter().filter(|p| p.stream_id == stream_id) {
            if !visit(packet) {
                break;
            }
        }
    }

    /// Stream ID of the oldest queued packet, waiting up to `timeout` for one.
    ///
    /// `None` timeout waits indefinitely. Returns `None` on timeout or stop.
    pub fn wait_for_any(&self, timeout: Option<Duration>) -> Option<String> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if !state.active {
                return None;
            }
            if let Some(front) = state.packets.front() {
                return Some(front.stream_id.clone());
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut state, deadline).timed_out()
                        && state.packets.is_empty()
                    {
                        return None;
                    }
                }
                None => self.not_empty.wait(&mut state),
            }
        }
    }

    /// Discard queued data for `stream_id` and drop its future data packets.
    ///
    /// Packets up to and including the stream's end-of-stream packet are
    /// removed, except the end-of-stream packet itself, which is kept with its
    /// payload emptied. If no end-of-stream packet is queued, later data
    /// packets for the ID are dropped on arrival until one arrives. Returns the
    /// number of packets removed.
    pub fn discard(&self, stream_id: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.packets.len();
        let mut reached_eos = false;
        let mut dropped_flags = SriChangeFlags::NONE;
        state.packets.retain_mut(|packet| {
            if reached_eos || packet.stream_id != stream_id {
                return true;
            }
            if packet.eos {
                reached_eos = true;
                packet.buffer = SharedBuffer::empty();
                packet.sri_change_flags |= std::mem::take(&mut dropped_flags);
                return true;
            }
            dropped_flags |= packet.sri_change_flags;
            false
        });
        if !reached_eos {
            state.disabled.insert(stream_id.to_string());
            *state.owed_flags.entry(stream_id.to_string()).or_default() |= dropped_flags;
        }
        let removed = before - state.packets.len();
        drop(state);

        // Readers waiting on this stream re-check whether it is still enabled
        self.not_empty.notify_all();
        if removed > 0 {
            self.not_full.notify_all();
        }
        debug!(stream_id, removed, "Discarded queued packets");
        removed
    }

    /// Resume queuing data packets for `stream_id`.
    pub fn enable(&self, stream_id: &str) {
        self.state.lock().disabled.remove(stream_id);
    }

    fn flush(state: &mut QueueState<T>) {
        let before = state.packets.len();
        let mut owed: HashMap<String, SriChangeFlags> = HashMap::new();
        let mut flushed: HashSet<String> = HashSet::new();
        let mut kept = VecDeque::with_capacity(before);

        for mut packet in state.packets.drain(..) {
            if packet.eos {
                if let Some(flags) = owed.remove(&packet.stream_id) {
                    packet.sri_change_flags |= flags;
                }
                if flushed.remove(&packet.stream_id) {
                    packet.input_queue_flushed = true;
                }
                kept.push_back(packet);
            } else {
                *owed.entry(packet.stream_id.clone()).or_default() |= packet.sri_change_flags;
                flushed.insert(packet.stream_id);
            }
        }

        state.packets = kept;
        for (stream_id, flags) in owed {
            *state.owed_flags.entry(stream_id).or_default() |= flags;
        }
        state.flushed.extend(flushed);
        warn!(dropped = before - state.packets.len(), "Input queue full, flushed");
    }

    fn settle_debts(state: &mut QueueState<T>, packet: &mut Packet<T>) {
        if let Some(flags) = state.owed_flags.remove(&packet.stream_id) {
            packet.sri_change_flags |= flags;
        }
        if state.flushed.remove(&packet.stream_id) {
            packet.input_queue_flushed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrecisionTime, StreamSri};
    use std::sync::Arc;
    use std::thread;

    fn packet(stream_id: &str, data: Vec<f32>, eos: bool) -> Packet<f32> {
        Packet {
            stream_id: stream_id.to_string(),
            buffer: SharedBuffer::from_vec(data),
            time: PrecisionTime::new(0.0, 0.0),
            eos,
            sri: Arc::new(StreamSri::new(stream_id)),
            sri_change_flags: SriChangeFlags::NONE,
            input_queue_flushed: false,
        }
    }

    fn started(depth: usize) -> PacketQueue<f32> {
        let queue = PacketQueue::new(depth);
        queue.start();
        queue
    }

    #[test]
    fn packets_are_received_per_stream_in_order() {
        let queue = started(10);
        queue.push(packet("a", vec![1.0], false), false);
        queue.push(packet("b", vec![2.0], false), false);
        queue.push(packet("a", vec![3.0], false), false);

        let take = |id: &str| match queue.next(id, |_| true) {
            Next::Packet(p) => p.buffer.to_vec(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(take("a"), vec![1.0]);
        assert_eq!(take("a"), vec![3.0]);
        assert_eq!(take("b"), vec![2.0]);
        assert!(matches!(queue.next("a", |_| true), Next::Empty));
    }

    #[test]
    fn refused_packets_stay_queued() {
        let queue = started(10);
        queue.push(packet("a", vec![1.0], false), false);
        assert!(matches!(queue.next("a", |_| false), Next::Refused));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn stopped_queue_refuses_receives() {
        let queue = PacketQueue::<f32>::new(4);
        queue.push(packet("a", vec![1.0], false), false);
        assert!(matches!(queue.next("a", |_| true), Next::Stopped));
        assert!(!queue.wait_for("a"));
    }

    #[test]
    fn overflow_flushes_data_but_keeps_end_of_stream() {
        let queue = started(3);
        let mut changed = packet("a", vec![1.0], false);
        changed.sri_change_flags = SriChangeFlags::XDELTA;
        queue.push(changed, false);
        queue.push(packet("b", vec![2.0], true), false);
        queue.push(packet("a", vec![3.0], false), false);

        let outcome = queue.push(packet("a", vec![4.0], false), false);
        assert_eq!(outcome, PushOutcome::QueuedAfterFlush);
        assert_eq!(queue.len(), 2);

        match queue.next("b", |_| true) {
            Next::Packet(p) => {
                assert!(p.eos);
                assert!(!p.input_queue_flushed);
            }
            other => panic!("unexpected {:?}", other),
        }
        match queue.next("a", |_| true) {
            Next::Packet(p) => {
                assert_eq!(p.buffer.to_vec(), vec![4.0]);
                assert!(p.input_queue_flushed);
                assert!(p.sri_change_flags.contains(SriChangeFlags::XDELTA));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn discard_keeps_end_of_stream_and_spares_successor() {
        let queue = started(10);
        queue.push(packet("a", vec![1.0], false), false);
        queue.push(packet("a", vec![2.0], true), false);
        queue.push(packet("a", vec![3.0], false), false);

        assert_eq!(queue.discard("a"), 1);
        match queue.next("a", |_| true) {
            Next::Packet(p) => {
                assert!(p.eos);
                assert!(p.buffer.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        // Data queued behind the end marker belongs to the next stream
        assert!(matches!(queue.next("a", |_| true), Next::Packet(_)));
    }

    #[test]
    fn disabled_stream_drops_data_until_end_of_stream() {
        let queue = started(10);
        queue.discard("a");
        assert_eq!(queue.push(packet("a", vec![1.0], false), false), PushOutcome::Dropped);
        assert_eq!(queue.push(packet("a", vec![2.0], true), false), PushOutcome::Queued);
        assert_eq!(queue.push(packet("a", vec![3.0], false), false), PushOutcome::Queued);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn blocking_receive_wakes_on_push() {
        let queue = Arc::new(started(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                assert!(queue.wait_for("a"));
                match queue.next("a", |_| true) {
                    Next::Packet(p) => p.buffer.to_vec(),
                    other => panic!("unexpected {:?}", other),
                }
            })
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(packet("a", vec![9.0], false), false);
        assert_eq!(consumer.join().unwrap(), vec![9.0]);
    }

    #[test]
    fn blocking_receive_wakes_on_stop() {
        let queue = Arc::new(started(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for("a"))
        };
        thread::sleep(Duration::from_millis(20));
        queue.stop();
        assert!(!consumer.join().unwrap());
    }

    #[test]
    fn dropped_packets_keep_their_sri_changes() {
        let queue = started(10);
        let mut queued = packet("a", vec![1.0], false);
        queued.sri_change_flags = SriChangeFlags::XDELTA;
        queue.push(queued, false);
        queue.discard("a");

        let mut arriving = packet("a", vec![2.0], false);
        arriving.sri_change_flags = SriChangeFlags::MODE;
        assert_eq!(queue.push(arriving, false), PushOutcome::Dropped);

        queue.enable("a");
        queue.push(packet("a", vec![3.0], false), false);
        match queue.next("a", |_| true) {
            Next::Packet(p) => {
                assert_eq!(p.buffer.to_vec(), vec![3.0]);
                assert!(p.sri_change_flags.contains(SriChangeFlags::XDELTA));
                assert!(p.sri_change_flags.contains(SriChangeFlags::MODE));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn discard_wakes_waiting_reader() {
        let queue = Arc::new(started(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for("a"))
        };
        thread::sleep(Duration::from_millis(20));
        queue.discard("a");
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn blocking_producer_waits_for_space() {
        let queue = Arc::new(started(1));
        queue.push(packet("a", vec![1.0], false), true);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(packet("a", vec![2.0], false), true))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.len(), 1);

        assert!(matches!(queue.next("a", |_| true), Next::Packet(_)));
        assert_eq!(producer.join().unwrap(), PushOutcome::Queued);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn wait_for_any_times_out() {
        let queue = started(4);
        assert_eq!(queue.wait_for_any(Some(Duration::from_millis(10))), None);
        queue.push(packet("z", vec![], false), false);
        assert_eq!(queue.wait_for_any(Some(Duration::from_millis(10))), Some("z".to_string()));
    }
}
