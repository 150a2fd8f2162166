//! # Simulated Loss
//!
//! Drop-decision policies injected into the receiver. The receiver protocol
//! itself is independent of the loss source: it only asks "should this
//! datagram disappear?" and still acknowledges its current expectation when
//! the answer is yes, which is exactly what exercises the sender's
//! fast-retransmit and timeout paths.

use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;

/// Decides, per inbound data frame, whether to simulate its loss.
pub trait DropPolicy {
    /// `seq` is the frame's starting byte offset. Called once per
    /// well-formed datagram, after it has been counted.
    fn should_drop(&mut self, seq: u32) -> bool;
}

// ─── No Loss ────────────────────────────────────────────────────────────────

/// Perfect channel: never drops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoss;

impl DropPolicy for NoLoss {
    fn should_drop(&mut self, _seq: u32) -> bool {
        false
    }
}

// ─── Probabilistic Loss ─────────────────────────────────────────────────────

/// Drops each datagram independently with probability `p`.
#[derive(Debug)]
pub struct RandomLoss {
    p: f64,
    rng: StdRng,
}

impl RandomLoss {
    /// Freshly seeded policy; `p` is clamped into `[0, 1]`.
    pub fn new(p: f64) -> Self {
        Self::with_rng(p, StdRng::seed_from_u64(rand::rng().random()))
    }

    /// Deterministically seeded policy for reproducible runs and tests.
    pub fn with_rng(p: f64, rng: StdRng) -> Self {
        RandomLoss {
            p: p.clamp(0.0, 1.0),
            rng,
        }
    }

    /// The clamped loss probability.
    pub fn probability(&self) -> f64 {
        self.p
    }
}

impl DropPolicy for RandomLoss {
    fn should_drop(&mut self, _seq: u32) -> bool {
        if self.p <= 0.0 {
            return false;
        }
        if self.p >= 1.0 {
            return true;
        }
        self.rng.random::<f64>() < self.p
    }
}

// ─── Forced Drop ────────────────────────────────────────────────────────────

/// Drops the first datagram whose starting offset matches, then disarms.
///
/// One-shot by design: the retransmission of the dropped segment carries the
/// same offset, and a rearming policy would swallow it too — the transfer
/// could never complete.
#[derive(Debug, Clone, Copy)]
pub struct ForcedDrop {
    seq: u32,
    fired: bool,
}

impl ForcedDrop {
    pub fn new(seq: u32) -> Self {
        ForcedDrop { seq, fired: false }
    }

    /// Whether the drop has already been applied.
    pub fn fired(&self) -> bool {
        self.fired
    }
}

impl DropPolicy for ForcedDrop {
    fn should_drop(&mut self, seq: u32) -> bool {
        if !self.fired && seq == self.seq {
            self.fired = true;
            return true;
        }
        false
    }
}
