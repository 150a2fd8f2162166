//! # Transfer Statistics
//!
//! Per-endpoint counters and the end-of-run report. Everything serializes to
//! JSON for log shipping.

use std::time::Duration;

use serde::Serialize;

// ─── Sender Stats ───────────────────────────────────────────────────────────

/// Aggregate sender-side statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SenderStats {
    /// Data frames put on the wire, including retransmissions.
    pub segments_sent: u64,
    /// Payload bytes put on the wire, including retransmissions.
    pub bytes_sent: u64,
    /// Frames that were repeat transmissions of a segment.
    pub retransmissions: u64,
    /// Retransmission timer expiries that signalled loss.
    pub timeouts: u64,
    /// Fast retransmits triggered by triple duplicate ACKs.
    pub fast_retransmits: u64,
    /// ACK frames received, of any kind.
    pub acks_received: u64,
    /// ACKs equal to the previous cumulative value.
    pub duplicate_acks: u64,
    /// ACKs below the previous cumulative value (ignored).
    pub stale_acks: u64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of wire transmissions that were retransmissions.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.segments_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.segments_sent as f64
        }
    }
}

// ─── Receiver Stats ─────────────────────────────────────────────────────────

/// Aggregate receiver-side statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiverStats {
    /// Datagrams read from the socket, including malformed and dropped ones.
    pub datagrams_received: u64,
    /// Segments accepted and written to the sink.
    pub segments_delivered: u64,
    /// Bytes written to the sink, in order.
    pub bytes_delivered: u64,
    /// Datagrams consumed by the simulated-loss policy.
    pub dropped: u64,
    /// Data frames whose offset was not the next expected byte.
    pub out_of_order: u64,
    /// Datagrams discarded as malformed (no ACK sent).
    pub malformed: u64,
    /// Cumulative ACKs sent.
    pub acks_sent: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered segments vs everything that arrived.
    pub fn goodput_ratio(&self) -> f64 {
        if self.datagrams_received == 0 {
            0.0
        } else {
            self.segments_delivered as f64 / self.datagrams_received as f64
        }
    }
}

// ─── Transfer Report ────────────────────────────────────────────────────────

/// End-of-run summary logged by the sender.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    /// Stream length in bytes.
    pub total_bytes: u64,
    /// Number of segments the stream was partitioned into.
    pub segments: u64,
    /// Wall-clock duration of the transfer.
    pub elapsed_secs: f64,
    /// Goodput in MiB/s (stream bytes over elapsed time).
    pub throughput_mib_s: f64,
    /// Congestion window at exit, in bytes.
    pub final_cwnd: f64,
    /// Slow-start threshold at exit, in bytes.
    pub final_ssthresh: f64,
    /// Full sender counters.
    pub stats: SenderStats,
}

impl TransferReport {
    pub fn new(
        total_bytes: u64,
        segments: u64,
        elapsed: Duration,
        final_cwnd: f64,
        final_ssthresh: f64,
        stats: SenderStats,
    ) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let throughput_mib_s = if elapsed_secs > 0.0 {
            total_bytes as f64 / elapsed_secs / (1024.0 * 1024.0)
        } else {
            0.0
        };
        TransferReport {
            total_bytes,
            segments,
            elapsed_secs,
            throughput_mib_s,
            final_cwnd,
            final_ssthresh,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Sender Ratios ──────────────────────────────────────────────────

    #[test]
    fn retransmit_ratio_basic() {
        let stats = SenderStats {
            segments_sent: 100,
            retransmissions: 5,
            ..Default::default()
        };
        assert!((stats.retransmit_ratio() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn retransmit_ratio_zero_div() {
        assert_eq!(SenderStats::new().retransmit_ratio(), 0.0);
    }

    // ─── Receiver Ratios ────────────────────────────────────────────────

    #[test]
    fn goodput_ratio_basic() {
        let stats = ReceiverStats {
            datagrams_received: 110,
            segments_delivered: 100,
            ..Default::default()
        };
        assert!((stats.goodput_ratio() - 100.0 / 110.0).abs() < 1e-9);
    }

    #[test]
    fn goodput_ratio_zero_div() {
        assert_eq!(ReceiverStats::new().goodput_ratio(), 0.0);
    }

    // ─── Report ─────────────────────────────────────────────────────────

    #[test]
    fn report_computes_throughput() {
        let report = TransferReport::new(
            2 * 1024 * 1024,
            1500,
            Duration::from_secs(2),
            14_000.0,
            65_536.0,
            SenderStats::new(),
        );
        assert!((report.throughput_mib_s - 1.0).abs() < 1e-9);
        assert!((report.elapsed_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn report_zero_elapsed_is_finite() {
        let report = TransferReport::new(100, 1, Duration::ZERO, 1400.0, 65_536.0, SenderStats::new());
        assert_eq!(report.throughput_mib_s, 0.0);
    }

    #[test]
    fn stats_serialize_to_json() {
        let stats = ReceiverStats {
            datagrams_received: 12,
            dropped: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"datagrams_received\":12"));
        assert!(json.contains("\"dropped\":2"));

        let report = TransferReport::new(
            100,
            1,
            Duration::from_millis(500),
            1400.0,
            65_536.0,
            SenderStats::new(),
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"total_bytes\":100"));
        assert!(json.contains("\"stats\""));
    }
}
