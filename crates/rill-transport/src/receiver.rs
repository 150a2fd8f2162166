//! # Receiver State Machine
//!
//! Pure logic — no I/O. Accepts raw datagrams from the network layer,
//! accepts only the segment starting exactly at the next expected byte,
//! and answers every counted datagram with the cumulative ACK.
//!
//! ## Responsibilities
//!
//! 1. **Validation**: discard malformed datagrams silently (no ACK)
//! 2. **Loss simulation**: consult the injected [`DropPolicy`] and consume
//!    dropped datagrams (still ACKing the current expectation)
//! 3. **In-order delivery**: accept `seq == expected` only; out-of-order
//!    segments are counted, never buffered
//! 4. **ACK generation**: exactly one cumulative ACK per counted datagram
//! 5. **Termination**: finish after acknowledging a FIN
//!
//! The whole reassembly state is the single `expected` counter — all
//! recovery complexity deliberately lives on the sender side, where the
//! congestion controller can see it.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::loss::DropPolicy;
use crate::stats::ReceiverStats;
use crate::wire::{AckFrame, DataFrame};

// ─── Receiver Events ────────────────────────────────────────────────────────

/// Events the receiver generates for the I/O layer.
#[derive(Debug)]
pub enum ReceiverEvent {
    /// In-order payload bytes ready for the sink.
    Deliver(Bytes),
    /// An ACK that must be sent back to the peer.
    Ack(AckFrame),
    /// The FIN has been acknowledged; the receiver is done.
    Finished,
}

// ─── Receiver ───────────────────────────────────────────────────────────────

/// Receiver state machine for a single transfer.
pub struct ReceiverMachine {
    /// Next expected byte offset; equals the bytes delivered to the sink.
    expected: u32,
    fin_received: bool,
    drop_policy: Box<dyn DropPolicy>,
    events: VecDeque<ReceiverEvent>,
    stats: ReceiverStats,
}

impl ReceiverMachine {
    /// Create a receiver with the given loss-simulation policy.
    pub fn new(drop_policy: Box<dyn DropPolicy>) -> Self {
        ReceiverMachine {
            expected: 0,
            fin_received: false,
            drop_policy,
            events: VecDeque::new(),
            stats: ReceiverStats::default(),
        }
    }

    /// Process one raw datagram from the network.
    pub fn on_datagram(&mut self, datagram: &[u8]) {
        self.stats.datagrams_received += 1;

        let frame = match DataFrame::decode(datagram) {
            Some(f) => f,
            None => {
                // Short header or size/length mismatch: discard without ACK.
                self.stats.malformed += 1;
                return;
            }
        };

        // The drop decision comes after the datagram is counted.
        if self.drop_policy.should_drop(frame.seq) {
            self.stats.dropped += 1;
            tracing::debug!(
                seq = frame.seq,
                len = frame.payload.len(),
                "simulating datagram loss"
            );
            self.push_ack();
            return;
        }

        if !frame.payload.is_empty() {
            if frame.seq == self.expected {
                tracing::trace!(seq = frame.seq, len = frame.payload.len(), "accepted");
                self.expected += frame.payload.len() as u32;
                self.stats.segments_delivered += 1;
                self.stats.bytes_delivered += frame.payload.len() as u64;
                self.events.push_back(ReceiverEvent::Deliver(frame.payload));
            } else {
                // Not the next expected byte: count it and let the repeated
                // cumulative ACK drive the sender's fast retransmit.
                self.stats.out_of_order += 1;
                tracing::debug!(
                    seq = frame.seq,
                    expected = self.expected,
                    "out-of-order segment"
                );
            }
        }

        if frame.fin {
            tracing::debug!(seq = frame.seq, "FIN received");
            self.fin_received = true;
        }

        self.push_ack();

        if self.fin_received {
            self.events.push_back(ReceiverEvent::Finished);
        }
    }

    fn push_ack(&mut self) {
        self.stats.acks_sent += 1;
        self.events
            .push_back(ReceiverEvent::Ack(AckFrame::new(self.expected)));
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    /// Drain pending events in generation order.
    pub fn drain_events(&mut self) -> impl Iterator<Item = ReceiverEvent> + '_ {
        self.events.drain(..)
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Next expected byte offset.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Whether a FIN has been seen.
    pub fn fin_received(&self) -> bool {
        self.fin_received
    }

    /// Receiver statistics.
    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }
}
