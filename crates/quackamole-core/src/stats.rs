//! Lock-free whack counters.
//!
//! Counters are plain atomics so concurrent whacks never contend with
//! each other or with the pond's periodic ticks.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Running totals derived from whack outcomes.
#[derive(Debug, Default)]
pub struct StatsCounter {
    total: AtomicU64,
    successful: AtomicU64,
    escapes: AtomicU64,
}

/// A point-in-time read of [`StatsCounter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Whacks attempted.
    pub total: u64,
    /// Whacks that hit a mole.
    pub successful: u64,
    /// Moles that escaped.
    pub escapes: u64,
}

impl Counters {
    /// Success rate in percent, as `successful / (total + 1) * 100`.
    ///
    /// Note the `+ 1`: a single successful whack reads 50%.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        self.successful as f64 / (self.total as f64 + 1.0) * 100.0
    }
}

impl StatsCounter {
    /// Create zeroed counters.
    pub const fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            escapes: AtomicU64::new(0),
        }
    }

    /// Count one whack with the given outcome flags.
    pub fn record(&self, success: bool, escaped: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        }
        if escaped {
            self.escapes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read all three counters.
    ///
    /// Each counter is read atomically; the three reads are not a single
    /// atomic snapshot.
    pub fn read(&self) -> Counters {
        Counters {
            total: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            escapes: self.escapes.load(Ordering::Relaxed),
        }
    }
}
