//! Outcome bookkeeping for a single circuit
//!
//! The failure count is consecutive: any success resets it to zero. There is
//! no time window. Cumulative counters are kept alongside for the
//! [`CircuitStats`] snapshot.
//!
//! Every mutation happens while the owning breaker holds its lock, so relaxed
//! atomics are sufficient. They exist so the state machine guards can read
//! the tally through the shared context.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Point-in-time snapshot of a circuit's cumulative counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitStats {
    /// Calls that reached the operation and succeeded
    pub successes: u64,
    /// Calls that reached the operation and failed
    pub failures: u64,
    /// Calls refused without invoking the operation
    pub rejections: u64,
    /// Number of transitions into Open
    pub times_opened: u64,
    /// Current consecutive failure count
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
pub struct Tally {
    consecutive_failures: AtomicU32,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
    times_opened: AtomicU64,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a success and clear the consecutive failure streak
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failure, returning the new consecutive failure count
    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_open(&self) {
        self.times_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CircuitStats {
        CircuitStats {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            times_opened: self.times_opened.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures(),
        }
    }
}
