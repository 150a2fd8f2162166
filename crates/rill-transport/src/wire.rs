//! # rill Wire Format
//!
//! Fixed-layout framing for the single-flow transfer protocol. All multi-byte
//! integer fields are big-endian on the wire; there is no prelude, version
//! field, or checksum (datagram integrity is the transport's problem).
//!
//! ## Data Frame (9-byte header + payload)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Sequence (starting byte offset)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload Length (bytes)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags     |                 Payload ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Flag bit 0 is FIN; the remaining bits are reserved and encoded as zero.
//! A data frame is well-formed iff the datagram is exactly `9 + len` bytes.
//! The FIN sentinel carries `seq = total_bytes`, `len = 0`.
//!
//! ## ACK Frame (5 bytes)
//!
//! ```text
//! +--------+--------+--------+--------+--------+
//! |      next expected byte (ack)     |  dup   |
//! +--------+--------+--------+--------+--------+
//! ```
//!
//! `dup` is an advisory duplicate hint: the receiver writes 0 and the sender
//! ignores it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Size of the data frame header preceding the payload.
pub const DATA_HEADER_LEN: usize = 9;

/// Size of an ACK frame.
pub const ACK_FRAME_LEN: usize = 5;

/// Largest payload permitted in a single data frame.
pub const MAX_SEGMENT_LEN: usize = 1400;

/// Flags bit 0: end of stream.
pub const FLAG_FIN: u8 = 0b0000_0001;

// ─── Data Frame ─────────────────────────────────────────────────────────────

/// A decoded data frame: a run of stream bytes at a given offset, or the FIN
/// sentinel (`payload` empty, `fin` set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Starting byte offset of the payload within the stream.
    pub seq: u32,
    /// End-of-stream marker.
    pub fin: bool,
    /// Payload bytes (empty for FIN).
    pub payload: Bytes,
}

impl DataFrame {
    /// Create a data frame carrying stream bytes.
    pub fn data(seq: u32, payload: Bytes) -> Self {
        DataFrame {
            seq,
            fin: false,
            payload,
        }
    }

    /// Create the FIN sentinel. `seq` must be the total stream length.
    pub fn fin(seq: u32) -> Self {
        DataFrame {
            seq,
            fin: true,
            payload: Bytes::new(),
        }
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Serialize into a wire datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + self.payload.len());
        buf.put_u32(self.seq);
        buf.put_u32(self.payload_len());
        buf.put_u8(if self.fin { FLAG_FIN } else { 0 });
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a datagram. Returns `None` if it is shorter than the header or
    /// its size disagrees with the declared payload length; malformed
    /// datagrams are silently discarded by both peers.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        if datagram.len() < DATA_HEADER_LEN {
            return None;
        }
        let mut buf = datagram;
        let seq = buf.get_u32();
        let len = buf.get_u32() as usize;
        let flags = buf.get_u8();
        if datagram.len() != DATA_HEADER_LEN + len {
            return None;
        }
        Some(DataFrame {
            seq,
            fin: flags & FLAG_FIN != 0,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

// ─── ACK Frame ──────────────────────────────────────────────────────────────

/// Cumulative acknowledgement: the next byte offset the receiver expects.
/// Implicitly acknowledges every lower offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    /// Next expected byte offset.
    pub ack: u32,
    /// Advisory duplicate hint; always 0 on the wire.
    pub dup: u8,
}

impl AckFrame {
    /// Create an ACK for the given next-expected offset.
    pub fn new(ack: u32) -> Self {
        AckFrame { ack, dup: 0 }
    }

    /// Serialize into a wire datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ACK_FRAME_LEN);
        buf.put_u32(self.ack);
        buf.put_u8(self.dup);
        buf.freeze()
    }

    /// Decode an ACK datagram. Returns `None` on short reads.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        if datagram.len() < ACK_FRAME_LEN {
            return None;
        }
        let mut buf = datagram;
        let ack = buf.get_u32();
        let dup = buf.get_u8();
        Some(AckFrame { ack, dup })
    }
}
