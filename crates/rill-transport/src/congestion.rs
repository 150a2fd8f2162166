//! # Reno Congestion Control
//!
//! Classic Reno loss-based congestion control over a byte-granular window:
//! slow start, congestion avoidance, fast retransmit on the third duplicate
//! ACK, fast recovery with per-duplicate window inflation, and a full
//! collapse to one MSS on retransmission timeout.
//!
//! ## State Machine
//!
//! ```text
//!                 new ACK, cwnd >= ssthresh
//!        ┌──────────┐ ───────────────────► ┌──────────┐
//!        │   SLOW   │                      │CONGESTION│
//!   ┌───►│  START   │                      │AVOIDANCE │◄──┐
//!   │    └────┬─────┘ ◄─────────────────── └────┬─────┘   │
//!   │         │            timeout              │         │
//!   │         │ 3rd dup ACK          3rd dup ACK│         │
//!   │ timeout │                                 │         │ new ACK
//!   │         ▼                                 ▼         │ (deflate)
//!   │    ┌─────────────────────────────────────────┐      │
//!   └────│              FAST RECOVERY              │──────┘
//!        │  (each further dup ACK inflates + MSS)  │
//!        └─────────────────────────────────────────┘
//! ```
//!
//! `cwnd` and `ssthresh` are carried as `f64` so the congestion-avoidance
//! increment `MSS²/cwnd` accumulates without integer truncation; admission
//! only ever consumes `⌊cwnd⌋` via [`RenoController::window`].

/// Initial slow-start threshold in bytes.
pub const INITIAL_SSTHRESH: f64 = 65536.0;

/// Number of duplicate ACKs that triggers fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

// ─── Phases and Signals ─────────────────────────────────────────────────────

/// The controller's current phase, derived from its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenoPhase {
    /// `cwnd < ssthresh` — exponential growth, one MSS per new ACK.
    SlowStart,
    /// `cwnd >= ssthresh` — additive growth, roughly one MSS per RTT.
    CongestionAvoidance,
    /// Responding to a triple-duplicate-ACK loss signal.
    FastRecovery,
}

/// What the caller should do after feeding a duplicate ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupAckSignal {
    /// Below the duplicate threshold; nothing to do.
    Ignore,
    /// In fast recovery; the window was inflated by one MSS, so the
    /// admission loop may release one more segment.
    InflateWindow,
    /// Third duplicate ACK: the caller should retransmit the oldest
    /// unacknowledged segment and apply [`RenoController::enter_fast_recovery`].
    EnterFastRetransmit,
}

// ─── Controller ─────────────────────────────────────────────────────────────

/// Reno congestion state for a single flow.
///
/// The controller owns only the arithmetic; deciding *which* segment to
/// retransmit and when the timer fires belongs to the sender state machine.
#[derive(Debug, Clone)]
pub struct RenoController {
    mss: f64,
    cwnd: f64,
    ssthresh: f64,
    in_fast_recovery: bool,
    dup_acks: u32,
}

impl RenoController {
    /// Create a controller with `cwnd = MSS` and the conventional 64 KiB
    /// initial threshold.
    pub fn new(mss: usize) -> Self {
        let mss = mss as f64;
        RenoController {
            mss,
            cwnd: mss,
            ssthresh: INITIAL_SSTHRESH,
            in_fast_recovery: false,
            dup_acks: 0,
        }
    }

    // ─── Getters ────────────────────────────────────────────────────────

    /// Allowed outstanding bytes as seen by the admission loop: `⌊cwnd⌋`.
    pub fn window(&self) -> u32 {
        self.cwnd as u32
    }

    /// Congestion window in bytes (real-valued).
    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    /// Slow-start threshold in bytes (real-valued).
    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn in_fast_recovery(&self) -> bool {
        self.in_fast_recovery
    }

    /// Consecutive duplicate ACKs observed for the current `last_acked`.
    pub fn dup_acks(&self) -> u32 {
        self.dup_acks
    }

    pub fn phase(&self) -> RenoPhase {
        if self.in_fast_recovery {
            RenoPhase::FastRecovery
        } else if self.cwnd < self.ssthresh {
            RenoPhase::SlowStart
        } else {
            RenoPhase::CongestionAvoidance
        }
    }

    // ─── Transitions ────────────────────────────────────────────────────

    /// A fresh cumulative ACK arrived covering `acked_segments` whole
    /// segments, with `inflight_bytes` still outstanding afterwards.
    ///
    /// Leaving fast recovery deflates the window to
    /// `max(ssthresh, inflight + 3·MSS)` and lands in congestion avoidance,
    /// immediately applying one avoidance round.
    pub fn on_new_ack(&mut self, acked_segments: u32, inflight_bytes: u64) {
        let a = acked_segments as f64;
        self.dup_acks = 0;

        if self.in_fast_recovery {
            self.cwnd = self.ssthresh.max(inflight_bytes as f64 + 3.0 * self.mss);
            self.in_fast_recovery = false;
            self.cwnd += self.mss * (self.mss / self.cwnd) * a;
        } else if self.cwnd < self.ssthresh {
            // Slow start: one MSS per newly acknowledged segment.
            self.cwnd += self.mss * a;
        } else {
            // Congestion avoidance: MSS²/cwnd per newly acknowledged segment.
            self.cwnd += self.mss * (self.mss / self.cwnd) * a;
        }
    }

    /// A duplicate ACK arrived (same value as the previous cumulative ACK).
    pub fn on_duplicate_ack(&mut self) -> DupAckSignal {
        self.dup_acks += 1;

        if self.in_fast_recovery {
            // Each further duplicate means one more segment left the
            // network: inflate so a new segment may be admitted.
            self.cwnd += self.mss;
            DupAckSignal::InflateWindow
        } else if self.dup_acks >= DUP_ACK_THRESHOLD {
            DupAckSignal::EnterFastRetransmit
        } else {
            DupAckSignal::Ignore
        }
    }

    /// Apply the fast retransmit / fast recovery entry:
    /// `ssthresh = max(cwnd/2, MSS)`, `cwnd = ssthresh + 3·MSS`.
    ///
    /// The `ssthresh = cwnd − MSS` clamp guards the invariant
    /// `ssthresh < cwnd` so the recovery exit lands in congestion avoidance.
    pub fn enter_fast_recovery(&mut self) {
        self.ssthresh = (self.cwnd / 2.0).max(self.mss);
        self.cwnd = self.ssthresh + 3.0 * self.mss;
        if self.ssthresh >= self.cwnd {
            self.ssthresh = self.cwnd - self.mss;
        }
        self.in_fast_recovery = true;
        self.dup_acks = 0;
    }

    /// Retransmission timeout: collapse to one MSS and restart slow start.
    /// `ssthresh` is forced strictly above MSS so the next ACK grows the
    /// window exponentially rather than entering avoidance at once.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2.0).max(self.mss);
        if self.ssthresh <= self.mss {
            self.ssthresh = 2.0 * self.mss;
        }
        self.cwnd = self.mss;
        self.in_fast_recovery = false;
        self.dup_acks = 0;
    }
}
