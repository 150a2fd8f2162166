//! # Segment Store
//!
//! Partitions the input stream into MSS-sized segments and tracks per-segment
//! send state. The store is a flat, contiguous array sized once at startup;
//! the sender's `base` and `next` cursors are plain indices into it. Payloads
//! are ref-counted slices of the single input buffer, so the store never
//! copies stream bytes.

use bytes::Bytes;

/// One contiguous run of stream bytes and its send state.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Starting byte offset within the stream.
    pub seq: u32,
    /// The segment's bytes; `0 < len <= mss`.
    pub payload: Bytes,
    /// Cleared when the segment must be (re)sent by the admission loop.
    pub sent: bool,
    /// Set once a cumulative ACK covers the segment's last byte.
    pub acked: bool,
    /// Number of times the segment has been put on the wire.
    pub transmissions: u32,
}

impl Segment {
    /// Payload length in bytes.
    pub fn len(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Offset one past the segment's last byte. A cumulative ACK of at least
    /// this value acknowledges the whole segment.
    pub fn end(&self) -> u32 {
        self.seq + self.len()
    }
}

/// The full partition of the input stream.
///
/// Invariants: segments tile the stream exactly (no gaps, no overlap);
/// for adjacent segments `s[i+1].seq == s[i].end()`.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    segments: Vec<Segment>,
    total_bytes: u32,
}

impl SegmentStore {
    /// Partition `data` into segments of at most `mss` bytes. An empty input
    /// yields an empty store (the transfer is then only a FIN).
    pub fn new(data: Bytes, mss: usize) -> Self {
        let mss = mss.max(1);
        let mut segments = Vec::with_capacity(data.len().div_ceil(mss));
        let mut offset = 0usize;
        while offset < data.len() {
            let end = (offset + mss).min(data.len());
            segments.push(Segment {
                seq: offset as u32,
                payload: data.slice(offset..end),
                sent: false,
                acked: false,
                transmissions: 0,
            });
            offset = end;
        }
        SegmentStore {
            segments,
            total_bytes: data.len() as u32,
        }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total stream length in bytes; also the FIN sequence number.
    pub fn total_bytes(&self) -> u32 {
        self.total_bytes
    }

    pub fn segment(&self, idx: usize) -> &Segment {
        &self.segments[idx]
    }

    pub fn segment_mut(&mut self, idx: usize) -> &mut Segment {
        &mut self.segments[idx]
    }

    /// Sum of payload lengths over the index range `[from, to)`.
    pub fn range_bytes(&self, from: usize, to: usize) -> u64 {
        self.segments[from..to].iter().map(|s| s.len() as u64).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }
}
