//! Read cursor over the packets a stream has pulled from its port
//!
//! The cursor owns the packets that have been taken from the port queue but
//! not fully consumed. `offset` counts the raw elements already consumed from
//! the front packet; `queued` is the number of raw elements still available
//! across all held packets. Packets are appended only while they continue the
//! same homogeneous run of data: once the cursor holds anything, a packet that
//! starts with an SRI change or a queue flush is left in the port queue, and
//! nothing is taken after an end-of-stream packet.

use std::collections::VecDeque;

use crate::block::DataBlock;
use crate::buffer::SharedBuffer;
use crate::queue::{Next, PacketQueue};
use crate::types::{
    Element, Packet, SampleTimestamp, SharedSri, SriChangeFlags, elements_per_sample,
};

/// Result of trying to extend the cursor by one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Fetch {
    /// A packet was appended.
    Fetched,
    /// The next packet starts a new run and cannot be joined to held data.
    Boundary,
    /// The cursor already holds the stream's end-of-stream packet.
    Ended,
    /// Nothing queued for the stream yet.
    Empty,
    /// The port was stopped.
    Stopped,
}

/// How much data a read produced and whether it was cut short.
pub(super) struct Gathered {
    /// Raw elements available for the read, at most the requested amount
    pub available: usize,
    /// A boundary or end-of-stream prevented a full read
    pub truncated: bool,
}

pub(super) struct Cursor<T> {
    packets: VecDeque<Packet<T>>,
    offset: usize,
    queued: usize,
    /// Flags from discarded empty packets, owed to the next fetched packet
    owed_flags: SriChangeFlags,
    owed_flush: bool,
    pub eos_reached: bool,
    pub closed: bool,
}

impl<T: Element> Cursor<T> {
    pub fn new() -> Self {
        Self {
            packets: VecDeque::new(),
            offset: 0,
            queued: 0,
            owed_flags: SriChangeFlags::NONE,
            owed_flush: false,
            eos_reached: false,
            closed: false,
        }
    }

    pub fn has_data(&self) -> bool {
        !self.packets.is_empty()
    }

    /// Raw elements still held.
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// SRI of the packet the next read starts in.
    pub fn front_sri(&self) -> Option<&SharedSri> {
        self.packets.front().map(|p| &p.sri)
    }

    /// Raw elements per sample for the data at the front of the cursor.
    pub fn factor(&self) -> usize {
        self.packets.front().map_or(1, |p| elements_per_sample::<T>(p.sri.is_complex()))
    }

    /// Raw elements left in the front packet.
    pub fn front_remaining(&self) -> usize {
        self.packets.front().map_or(0, |p| p.buffer.len() - self.offset)
    }

    pub fn holds_eos(&self) -> bool {
        self.packets.back().is_some_and(|p| p.eos)
    }

    /// Take the next packet for `stream_id` from the port queue. Never waits.
    pub fn fetch(&mut self, queue: &PacketQueue<T>, stream_id: &str) -> Fetch {
        loop {
            if self.holds_eos() {
                return Fetch::Ended;
            }
            let joining = self.has_data();
            let next = queue.next(stream_id, |p| !(joining && p.is_boundary()));
            let mut packet = match next {
                Next::Packet(packet) => packet,
                Next::Refused => return Fetch::Boundary,
                Next::Empty => return Fetch::Empty,
                Next::Stopped => return Fetch::Stopped,
            };

            if packet.buffer.is_empty() && !packet.eos {
                // An empty packet carries nothing to read; its flags move on
                self.owed_flags |= packet.sri_change_flags;
                self.owed_flush |= packet.input_queue_flushed;
                continue;
            }

            packet.sri_change_flags |= std::mem::take(&mut self.owed_flags);
            packet.input_queue_flushed |= std::mem::take(&mut self.owed_flush);
            self.queued += packet.buffer.len();
            self.packets.push_back(packet);
            return Fetch::Fetched;
        }
    }

    /// Fetch until `want` raw elements are held or something stops the read.
    ///
    /// Fails with [`Fetch::Empty`] when more data could still arrive and with
    /// [`Fetch::Stopped`] when the port stopped. Packets fetched before the
    /// failure stay held for the next attempt.
    pub fn gather(
        &mut self,
        queue: &PacketQueue<T>,
        stream_id: &str,
        want: usize,
    ) -> Result<Gathered, Fetch> {
        let mut truncated = false;
        while self.queued < want {
            match self.fetch(queue, stream_id) {
                Fetch::Fetched => {}
                Fetch::Boundary | Fetch::Ended => {
                    truncated = true;
                    break;
                }
                failed @ (Fetch::Empty | Fetch::Stopped) => return Err(failed),
            }
        }
        Ok(Gathered { available: self.queued.min(want), truncated })
    }

    /// Build a block from the next `count` raw elements without consuming them.
    ///
    /// The first time stamp is real when the block starts on a packet boundary
    /// and interpolated from the packet's time otherwise. Every later packet
    /// contributes its own time stamp at the sample where it begins. The front
    /// packet's SRI change and flush flags are attached to the block and then
    /// cleared so they are reported once.
    pub fn assemble(&mut self, count: usize) -> Option<DataBlock<T>> {
        let factor = self.factor();
        let front = self.packets.front_mut()?;
        let sri = front.sri.clone();
        let flags = std::mem::take(&mut front.sri_change_flags);
        let flushed = std::mem::take(&mut front.input_queue_flushed);

        let mut parts = Vec::new();
        let mut timestamps = Vec::new();
        let mut position = self.offset;
        let mut copied = 0;

        for packet in &self.packets {
            let take = (packet.buffer.len() - position).min(count - copied);
            let sample_offset = copied / factor;
            let timestamp = if position == 0 {
                SampleTimestamp::new(packet.time, sample_offset)
            } else {
                let elapsed = (position / factor) as f64 * packet.sri.xdelta;
                SampleTimestamp::synthetic(packet.time + elapsed, sample_offset)
            };
            timestamps.push(timestamp);
            parts.push(packet.buffer.slice(position..position + take));
            copied += take;
            position = 0;
            if copied == count {
                break;
            }
        }

        let buffer = match parts.len() {
            1 => parts.pop().unwrap_or_default(),
            _ => SharedBuffer::concat(&parts),
        };

        let mut block = DataBlock::new(sri, buffer);
        for timestamp in timestamps {
            block.add_timestamp(timestamp);
        }
        block.set_sri_change_flags(flags);
        block.set_input_queue_flushed(flushed);
        Some(block)
    }

    /// Advance past `count` raw elements, releasing finished packets.
    ///
    /// Fully consuming an end-of-stream packet marks the end of the stream.
    pub fn consume(&mut self, mut count: usize) {
        while let Some(front) = self.packets.front() {
            let remaining = front.buffer.len() - self.offset;
            if count < remaining {
                self.offset += count;
                self.queued -= count;
                return;
            }
            count -= remaining;
            self.queued -= remaining;
            self.offset = 0;
            if let Some(packet) = self.packets.pop_front() {
                if packet.eos {
                    self.eos_reached = true;
                    return;
                }
            }
        }
    }

    /// Forget the front packet's flags without reporting them.
    pub fn clear_front_flags(&mut self) {
        if let Some(front) = self.packets.front_mut() {
            front.sri_change_flags = SriChangeFlags::NONE;
            front.input_queue_flushed = false;
        }
    }

    /// Drop all held data. An end-of-stream packet is kept, emptied, so the
    /// stream can still finish. Unreported SRI changes are kept as well.
    pub fn discard(&mut self) {
        let mut flags = std::mem::take(&mut self.owed_flags);
        let mut eos = None;
        for packet in self.packets.drain(..) {
            flags |= packet.sri_change_flags;
            if packet.eos {
                eos = Some(packet);
            }
        }
        self.offset = 0;
        self.queued = 0;
        self.owed_flush = false;
        match eos {
            Some(mut packet) => {
                packet.buffer = SharedBuffer::empty();
                packet.sri_change_flags = flags;
                self.packets.push_back(packet);
            }
            None => self.owed_flags = flags,
        }
    }
}
