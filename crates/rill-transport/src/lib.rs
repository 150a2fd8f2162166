//! # rill-transport
//!
//! rill transport core: reliable, ordered byte-stream file transfer over an
//! unreliable datagram channel, between one sender and one receiver.
//!
//! The sender runs a Reno-style congestion controller (slow start,
//! congestion avoidance, fast retransmit, fast recovery, timeout recovery)
//! over a byte-granular sliding window; the receiver is a purely cumulative
//! in-order reassembler whose repeated ACKs are the sender's loss signal.
//! Both state machines are pure logic — sockets, clocks, and sinks belong to
//! the binaries driving them.
//!
//! ## Crate structure
//!
//! - [`wire`] — data/ACK frame serialization, big-endian fixed layout
//! - [`segment`] — contiguous segment store partitioning the input stream
//! - [`congestion`] — Reno congestion controller
//! - [`sender`] — sender state machine (window, timer, retransmission)
//! - [`receiver`] — receiver state machine (cumulative ACK, in-order sink)
//! - [`loss`] — injected drop policies for simulated loss
//! - [`stats`] — per-endpoint statistics and the transfer report

pub mod congestion;
pub mod loss;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod stats;
pub mod wire;
