//! # Sender State Machine
//!
//! Pure logic — no I/O. Owns the segment store, the Reno controller, the
//! sliding-window cursors, and the single retransmission timer, and produces
//! ready-to-send wire frames for the I/O layer to dispatch.
//!
//! ## Responsibilities
//!
//! 1. **Admission**: release unsent segments while outstanding bytes stay
//!    under `⌊cwnd⌋`
//! 2. **ACK processing**: advance `base` on fresh cumulative ACKs, count
//!    duplicates, trigger fast retransmit on the third
//! 3. **Timer**: one deadline, armed while anything is outstanding,
//!    restarted on fresh ACKs and retransmissions
//! 4. **Timeout recovery**: collapse the window and re-drive the oldest
//!    unacknowledged segment through the admission loop
//! 5. **Termination**: report completion once every byte is acknowledged and
//!    hand out the FIN frame
//!
//! The machine does NOT own a socket or a clock — the caller passes `now`
//! into every time-sensitive operation and sleeps until [`SenderMachine::deadline`].

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use quanta::Instant;

use crate::congestion::{DupAckSignal, RenoController};
use crate::segment::SegmentStore;
use crate::stats::SenderStats;
use crate::wire::{AckFrame, DataFrame, MAX_SEGMENT_LEN};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Fallback MSS when the configured value is out of range.
pub const DEFAULT_MSS: usize = MAX_SEGMENT_LEN;

/// Default retransmission timeout.
pub const DEFAULT_RTO: Duration = Duration::from_millis(200);

/// Smallest permitted retransmission timeout.
pub const MIN_RTO: Duration = Duration::from_millis(50);

/// Sender configuration parameters.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum segment size in bytes.
    pub mss: usize,
    /// Fixed retransmission timeout.
    pub rto: Duration,
}

impl SenderConfig {
    /// Build a config, clamping MSS into `[1, 1400]` (out-of-range values
    /// fall back to 1400) and flooring the RTO at 50 ms.
    pub fn new(mss: usize, rto: Duration) -> Self {
        SenderConfig {
            mss: if (1..=MAX_SEGMENT_LEN).contains(&mss) {
                mss
            } else {
                DEFAULT_MSS
            },
            rto: rto.max(MIN_RTO),
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            mss: DEFAULT_MSS,
            rto: DEFAULT_RTO,
        }
    }
}

// ─── Output Frame ───────────────────────────────────────────────────────────

/// A wire-format data frame ready for the socket.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    /// Serialized frame bytes (header + payload).
    pub data: Bytes,
    /// Starting byte offset of the carried segment.
    pub seq: u32,
    /// Payload length of the carried segment.
    pub len: u32,
    /// Whether the segment had already been on the wire before.
    pub is_retransmit: bool,
}

// ─── Sender ─────────────────────────────────────────────────────────────────

/// Sender state machine for a single transfer.
pub struct SenderMachine {
    config: SenderConfig,
    store: SegmentStore,
    ctrl: RenoController,
    /// Index of the oldest not-yet-acknowledged segment.
    base: usize,
    /// Index of the first segment not yet scheduled by the admission loop.
    next: usize,
    /// Highest cumulative ACK observed.
    last_acked: u32,
    /// Retransmission timer start; `None` while nothing is outstanding.
    timer: Option<Instant>,
    out: VecDeque<OutputFrame>,
    stats: SenderStats,
}

impl SenderMachine {
    /// Segment the input and initialise the controller.
    pub fn new(data: Bytes, config: SenderConfig) -> Self {
        let store = SegmentStore::new(data, config.mss);
        let ctrl = RenoController::new(config.mss);
        SenderMachine {
            config,
            store,
            ctrl,
            base: 0,
            next: 0,
            last_acked: 0,
            timer: None,
            out: VecDeque::new(),
            stats: SenderStats::default(),
        }
    }

    // ─── Admission ──────────────────────────────────────────────────────

    /// Release segments into the window while outstanding bytes stay below
    /// `⌊cwnd⌋`. Segments still marked `sent` after a loss event are counted
    /// as outstanding but not re-encoded. Arms the timer if it was disarmed.
    pub fn fill_window(&mut self, now: Instant) {
        let window = self.ctrl.window() as u64;
        let mut outstanding = self.outstanding_bytes();
        while outstanding < window && self.next < self.store.len() {
            let idx = self.next;
            let len = self.store.segment(idx).len() as u64;
            if !self.store.segment(idx).sent {
                self.emit(idx);
            }
            outstanding += len;
            self.next += 1;
            if self.timer.is_none() {
                self.timer = Some(now);
            }
        }
    }

    /// Encode segment `idx`, mark it sent, and queue it for the socket.
    fn emit(&mut self, idx: usize) {
        let (data, seq, len, is_retransmit) = {
            let seg = self.store.segment_mut(idx);
            let is_retransmit = seg.transmissions > 0;
            seg.sent = true;
            seg.transmissions += 1;
            (
                DataFrame::data(seg.seq, seg.payload.clone()).encode(),
                seg.seq,
                seg.len(),
                is_retransmit,
            )
        };
        tracing::trace!(seq, len, is_retransmit, "queueing data frame");
        self.out.push_back(OutputFrame {
            data,
            seq,
            len,
            is_retransmit,
        });
        self.stats.segments_sent += 1;
        self.stats.bytes_sent += len as u64;
        if is_retransmit {
            self.stats.retransmissions += 1;
        }
    }

    // ─── ACK Processing ─────────────────────────────────────────────────

    /// Process a cumulative ACK. Fresh ACKs advance the window and feed the
    /// controller; duplicates count toward fast retransmit; stale ACKs are
    /// ignored.
    pub fn on_ack(&mut self, ack: AckFrame, now: Instant) {
        self.stats.acks_received += 1;

        if ack.ack > self.last_acked {
            self.on_new_ack(ack.ack, now);
        } else if ack.ack == self.last_acked {
            self.stats.duplicate_acks += 1;
            if self.ctrl.on_duplicate_ack() == DupAckSignal::EnterFastRetransmit
                && self.base < self.store.len()
            {
                self.fast_retransmit(now);
            }
        } else {
            self.stats.stale_acks += 1;
        }
    }

    fn on_new_ack(&mut self, ack: u32, now: Instant) {
        let was_fast_recovery = self.ctrl.in_fast_recovery();

        let mut acked_segments = 0u32;
        while self.base < self.store.len() && self.store.segment(self.base).end() <= ack {
            self.store.segment_mut(self.base).acked = true;
            self.base += 1;
            acked_segments += 1;
        }
        // A delayed ACK arriving after a timeout collapse can overtake the
        // rewound admission cursor; keep base <= next <= N.
        self.next = self.next.max(self.base);
        self.last_acked = ack;

        self.ctrl.on_new_ack(acked_segments, self.outstanding_bytes());
        if was_fast_recovery {
            tracing::debug!(
                ack,
                cwnd = self.ctrl.cwnd(),
                ssthresh = self.ctrl.ssthresh(),
                "fast recovery exited"
            );
        } else {
            tracing::trace!(ack, acked_segments, cwnd = self.ctrl.cwnd(), "new ACK");
        }

        if self.base == self.next {
            // Window drained — nothing left to time.
            self.timer = None;
        } else {
            self.timer = Some(now);
        }
    }

    /// Third duplicate ACK: halve, retransmit the oldest unacknowledged
    /// segment immediately, and enter fast recovery.
    fn fast_retransmit(&mut self, now: Instant) {
        self.ctrl.enter_fast_recovery();
        self.stats.fast_retransmits += 1;
        tracing::debug!(
            seq = self.store.segment(self.base).seq,
            cwnd = self.ctrl.cwnd(),
            ssthresh = self.ctrl.ssthresh(),
            "triple duplicate ACK, fast retransmit"
        );
        self.emit(self.base);
        self.next = self.base + 1;
        self.timer = Some(now);
    }

    // ─── Timeout ────────────────────────────────────────────────────────

    /// Retransmission timer expiry. Collapses the controller to one MSS,
    /// clears the send mark on the prefix of the window that fits the
    /// collapsed `cwnd`, and rewinds `next` to `base` so the admission loop
    /// re-sends it in order.
    pub fn on_timeout(&mut self, now: Instant) {
        if self.base >= self.store.len() {
            // Nothing outstanding; unreachable by construction, but if the
            // I/O layer routes a spurious expiry here, re-arm and carry on.
            self.timer = Some(now);
            return;
        }

        self.stats.timeouts += 1;
        self.ctrl.on_timeout();
        tracing::debug!(
            seq = self.store.segment(self.base).seq,
            cwnd = self.ctrl.cwnd(),
            ssthresh = self.ctrl.ssthresh(),
            "retransmission timeout"
        );

        let window = self.ctrl.window() as u64;
        self.store.segment_mut(self.base).sent = false;
        let mut cumulative = 0u64;
        for idx in (self.base + 1)..self.store.len() {
            cumulative += self.store.segment(idx).len() as u64;
            if cumulative > window {
                break;
            }
            self.store.segment_mut(idx).sent = false;
        }
        self.next = self.base;
        self.timer = Some(now);
    }

    // ─── Termination ────────────────────────────────────────────────────

    /// Whether every byte has been cumulatively acknowledged.
    pub fn is_complete(&self) -> bool {
        self.base == self.store.len()
    }

    /// The FIN sentinel closing the stream: `seq = total_bytes`, no payload.
    pub fn fin_frame(&self) -> Bytes {
        DataFrame::fin(self.store.total_bytes()).encode()
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    /// When the retransmission timer expires, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.map(|start| start + self.config.rto)
    }

    /// Whether the retransmission timer is armed. Holds exactly when
    /// segments are outstanding (`base < next`).
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Bytes transmitted but not yet cumulatively acknowledged.
    pub fn outstanding_bytes(&self) -> u64 {
        self.store.range_bytes(self.base, self.next)
    }

    /// Drain frames ready for the socket.
    pub fn drain_output(&mut self) -> impl Iterator<Item = OutputFrame> + '_ {
        self.out.drain(..)
    }

    /// Number of queued output frames.
    pub fn output_len(&self) -> usize {
        self.out.len()
    }

    /// Number of segments in the transfer.
    pub fn segment_count(&self) -> usize {
        self.store.len()
    }

    /// Total stream length in bytes.
    pub fn total_bytes(&self) -> u32 {
        self.store.total_bytes()
    }

    /// Highest cumulative ACK observed so far.
    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    /// The congestion controller (read-only).
    pub fn controller(&self) -> &RenoController {
        &self.ctrl
    }

    /// Sender statistics.
    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::RenoPhase;

    const MSS: usize = 1000;

    fn machine(total: usize) -> SenderMachine {
        let data = Bytes::from((0..total).map(|i| (i % 251) as u8).collect::<Vec<u8>>());
        SenderMachine::new(data, SenderConfig::new(MSS, DEFAULT_RTO))
    }

    fn ack(machine: &mut SenderMachine, value: u32, now: Instant) {
        machine.on_ack(AckFrame::new(value), now);
    }

    // ─── Config Clamping ────────────────────────────────────────────────

    #[test]
    fn config_clamps_mss_and_floors_rto() {
        let cfg = SenderConfig::new(0, Duration::from_millis(10));
        assert_eq!(cfg.mss, DEFAULT_MSS);
        assert_eq!(cfg.rto, MIN_RTO);

        let cfg = SenderConfig::new(2000, Duration::from_millis(500));
        assert_eq!(cfg.mss, DEFAULT_MSS, "oversized MSS falls back to 1400");
        assert_eq!(cfg.rto, Duration::from_millis(500));

        let cfg = SenderConfig::new(1, DEFAULT_RTO);
        assert_eq!(cfg.mss, 1);
    }

    // ─── Admission ──────────────────────────────────────────────────────

    #[test]
    fn initial_window_admits_one_mss() {
        let mut m = machine(10_000);
        m.fill_window(Instant::now());

        let out: Vec<_> = m.drain_output().collect();
        assert_eq!(out.len(), 1, "cwnd starts at one MSS");
        assert_eq!(out[0].seq, 0);
        assert_eq!(out[0].len, MSS as u32);
        assert!(!out[0].is_retransmit);
        assert!(m.timer_armed());
    }

    #[test]
    fn window_discipline_never_exceeds_floor_plus_mss() {
        let mut m = machine(100_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now);
        ack(&mut m, 3000, now);
        m.fill_window(now);

        let bound = m.controller().window() as u64 + MSS as u64 - 1;
        assert!(
            m.outstanding_bytes() <= bound,
            "outstanding {} exceeds ⌊cwnd⌋+MSS-1 = {bound}",
            m.outstanding_bytes()
        );
    }

    #[test]
    fn fill_window_is_idempotent() {
        let mut m = machine(10_000);
        let now = Instant::now();
        m.fill_window(now);
        m.drain_output().for_each(drop);
        m.fill_window(now);
        assert_eq!(m.output_len(), 0, "no capacity, nothing new to send");
    }

    // ─── ACK Processing ─────────────────────────────────────────────────

    #[test]
    fn new_ack_advances_and_grows_window() {
        let mut m = machine(10_000);
        let now = Instant::now();
        m.fill_window(now);
        m.drain_output().for_each(drop);

        ack(&mut m, 1000, now);
        assert_eq!(m.last_acked(), 1000);
        assert_eq!(m.controller().window(), 2 * MSS as u32);

        m.fill_window(now);
        let out: Vec<_> = m.drain_output().collect();
        assert_eq!(out.len(), 2, "doubled window admits two segments");
        assert_eq!(out[0].seq, 1000);
        assert_eq!(out[1].seq, 2000);
    }

    #[test]
    fn cumulative_ack_covers_multiple_segments() {
        let mut m = machine(10_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now);
        m.drain_output().for_each(drop);

        // One ACK covering both outstanding segments.
        ack(&mut m, 3000, now);
        assert_eq!(m.outstanding_bytes(), 0);
        assert_eq!(m.controller().window(), 4 * MSS as u32);
    }

    #[test]
    fn stale_ack_is_ignored() {
        let mut m = machine(10_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 2000, now);
        let cwnd = m.controller().cwnd();

        ack(&mut m, 1000, now);
        assert_eq!(m.last_acked(), 2000);
        assert_eq!(m.controller().cwnd(), cwnd);
        assert_eq!(m.stats().stale_acks, 1);
    }

    // ─── Timer Discipline ───────────────────────────────────────────────

    #[test]
    fn timer_disarms_exactly_when_window_empties() {
        let mut m = machine(2000);
        let now = Instant::now();
        m.fill_window(now);
        assert!(m.timer_armed());

        ack(&mut m, 1000, now);
        assert!(
            !m.timer_armed(),
            "first segment acknowledged, second not yet admitted"
        );

        m.fill_window(now);
        assert!(m.timer_armed(), "re-armed by the second transmission");
        ack(&mut m, 2000, now);
        assert!(!m.timer_armed(), "window drained, timer must disarm");
        assert!(m.is_complete());
    }

    #[test]
    fn deadline_is_timer_start_plus_rto() {
        let mut m = machine(1000);
        let now = Instant::now();
        m.fill_window(now);
        assert_eq!(m.deadline(), Some(now + DEFAULT_RTO));
    }

    // ─── Fast Retransmit / Fast Recovery ────────────────────────────────

    #[test]
    fn third_duplicate_ack_retransmits_base() {
        let mut m = machine(10_000);
        let now = Instant::now();
        // Grow the window and lose seq 1000: ACKs stick at 1000.
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now);
        m.drain_output().for_each(drop);

        ack(&mut m, 1000, now); // dup 1
        ack(&mut m, 1000, now); // dup 2
        assert_eq!(m.output_len(), 0);
        ack(&mut m, 1000, now); // dup 3 → fast retransmit

        let out: Vec<_> = m.drain_output().collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].seq, 1000, "oldest unacked segment is retransmitted");
        assert!(out[0].is_retransmit);
        assert!(m.controller().in_fast_recovery());
        assert_eq!(m.stats().fast_retransmits, 1);
        assert!(m.timer_armed());
    }

    #[test]
    fn recovery_inflation_releases_new_segments() {
        let mut m = machine(40_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now);
        ack(&mut m, 3000, now);
        m.fill_window(now); // cwnd = 4 MSS, segments 3000..7000 in flight
        m.drain_output().for_each(drop);

        for _ in 0..3 {
            ack(&mut m, 3000, now);
        }
        m.drain_output().for_each(drop); // the fast retransmit itself
        m.fill_window(now);
        m.drain_output().for_each(drop); // capacity released by the entry window

        // Each further duplicate inflates cwnd by one MSS, releasing exactly
        // one new segment through the admission loop.
        ack(&mut m, 3000, now);
        m.fill_window(now);
        let out: Vec<_> = m.drain_output().collect();
        assert_eq!(out.len(), 1, "one duplicate releases one new segment");
        assert!(!out[0].is_retransmit);
    }

    #[test]
    fn new_ack_exits_recovery_into_avoidance() {
        let mut m = machine(40_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now);
        m.drain_output().for_each(drop);
        for _ in 0..3 {
            ack(&mut m, 1000, now);
        }
        assert!(m.controller().in_fast_recovery());

        ack(&mut m, 3000, now);
        assert!(!m.controller().in_fast_recovery());
        assert_eq!(m.controller().phase(), RenoPhase::CongestionAvoidance);
        assert!(
            m.controller().cwnd() >= m.controller().ssthresh(),
            "recovery exit must land at or above ssthresh"
        );
    }

    #[test]
    fn duplicates_before_threshold_do_not_retransmit() {
        let mut m = machine(10_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now);
        m.drain_output().for_each(drop);

        ack(&mut m, 1000, now);
        ack(&mut m, 1000, now);
        assert_eq!(m.output_len(), 0);
        assert_eq!(m.stats().duplicate_acks, 2);
        assert_eq!(m.stats().fast_retransmits, 0);
    }

    // ─── Timeout Recovery ───────────────────────────────────────────────

    #[test]
    fn timeout_collapses_window_and_resends_base() {
        let mut m = machine(10_000);
        let t0 = Instant::now();
        m.fill_window(t0);
        ack(&mut m, 1000, t0);
        m.fill_window(t0);
        m.drain_output().for_each(drop);

        let expiry = t0 + DEFAULT_RTO;
        m.on_timeout(expiry);
        assert_eq!(m.controller().window(), MSS as u32);
        assert_eq!(m.stats().timeouts, 1);
        assert!(m.timer_armed());

        m.fill_window(expiry);
        let out: Vec<_> = m.drain_output().collect();
        assert_eq!(out.len(), 1, "collapsed window re-sends only the base");
        assert_eq!(out[0].seq, 1000);
        assert!(out[0].is_retransmit);
        assert_eq!(m.stats().retransmissions, 1);
    }

    #[test]
    fn timeout_halves_ssthresh_from_grown_window() {
        let mut m = machine(40_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now);
        ack(&mut m, 3000, now); // cwnd = 4 MSS

        m.on_timeout(now + DEFAULT_RTO);
        assert_eq!(m.controller().ssthresh(), 2.0 * MSS as f64);
        assert_eq!(m.controller().cwnd(), MSS as f64);
    }

    #[test]
    fn delayed_ack_after_timeout_collapse_keeps_cursors_ordered() {
        let mut m = machine(10_000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        m.fill_window(now); // seqs 1000 and 2000 in flight
        m.drain_output().for_each(drop);

        // Timer fires, rewinding the admission cursor to base.
        m.on_timeout(now + DEFAULT_RTO);

        // The ACK for the pre-timeout transmissions arrives late and covers
        // both collapsed segments.
        ack(&mut m, 3000, now + DEFAULT_RTO);
        assert_eq!(m.outstanding_bytes(), 0);
        assert!(!m.timer_armed());

        // Admission resumes at the first unacknowledged segment; nothing
        // already acknowledged is re-sent.
        m.fill_window(now + DEFAULT_RTO);
        let out: Vec<_> = m.drain_output().collect();
        assert!(!out.is_empty());
        assert_eq!(out[0].seq, 3000);
    }

    #[test]
    fn spurious_timeout_with_nothing_outstanding_rearms() {
        let mut m = machine(1000);
        let now = Instant::now();
        m.fill_window(now);
        ack(&mut m, 1000, now);
        assert!(m.is_complete());

        m.on_timeout(now + DEFAULT_RTO);
        assert_eq!(m.stats().timeouts, 0, "not counted as a loss event");
        assert!(m.timer_armed());
    }

    // ─── Termination ────────────────────────────────────────────────────

    #[test]
    fn completes_after_all_bytes_acked() {
        let mut m = machine(2500);
        let now = Instant::now();
        while !m.is_complete() {
            m.fill_window(now);
            let frames: Vec<_> = m.drain_output().collect();
            for f in &frames {
                ack(&mut m, f.seq + f.len, now);
            }
        }
        assert_eq!(m.last_acked(), 2500);
        assert!(!m.timer_armed());
    }

    #[test]
    fn fin_frame_carries_total_length() {
        let m = machine(2500);
        let fin = crate::wire::DataFrame::decode(&m.fin_frame()).unwrap();
        assert_eq!(fin.seq, 2500);
        assert!(fin.fin);
        assert!(fin.payload.is_empty());
    }

    #[test]
    fn empty_input_is_complete_immediately() {
        let mut m = machine(0);
        assert!(m.is_complete());
        m.fill_window(Instant::now());
        assert_eq!(m.output_len(), 0);
        assert!(!m.timer_armed());
        let fin = crate::wire::DataFrame::decode(&m.fin_frame()).unwrap();
        assert_eq!(fin.seq, 0);
        assert!(fin.fin);
    }

    // ─── MSS = 1 Pathological ───────────────────────────────────────────

    #[test]
    fn single_byte_mss_transfers_byte_at_a_time() {
        let data = Bytes::from_static(b"seven!!");
        let mut m = SenderMachine::new(data, SenderConfig::new(1, DEFAULT_RTO));
        assert_eq!(m.segment_count(), 7);

        let now = Instant::now();
        let mut acked = 0u32;
        while !m.is_complete() {
            m.fill_window(now);
            let frames: Vec<_> = m.drain_output().collect();
            assert!(!frames.is_empty(), "window must always admit one segment");
            for f in &frames {
                assert_eq!(f.len, 1);
                acked = f.seq + 1;
                ack(&mut m, acked, now);
            }
        }
        assert_eq!(acked, 7);
    }
}
