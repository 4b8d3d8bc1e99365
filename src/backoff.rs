//! Spin-then-yield backoff shared by the node lock and the optimistic retry loop.

use std::hint as StdHint;
use std::thread as StdThread;

/// Spins handled with a pause hint before falling back to `yield_now`.
const SPIN_LIMIT: u32 = 64;

/// Progressive backoff for a single waiting loop.
///
/// Phase 1 (first [`SPIN_LIMIT`] calls): `spin_loop` hint, for locks that are
/// released within a few hundred cycles.
/// Phase 2: `yield_now`, so an oversubscribed machine lets the holder run.
///
/// The backoff never sleeps and never gives up. Callers that need a bound
/// count iterations themselves.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    pub(crate) const fn new() -> Self {
        Self { step: 0 }
    }

    /// Wait a little, longer on every call.
    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.step < SPIN_LIMIT {
            for _ in 0..=self.step.min(6) {
                StdHint::spin_loop();
            }
            self.step += 1;
        } else {
            StdThread::yield_now();
        }
    }

    /// Number of `snooze` calls so far (saturates at the spin limit).
    #[cfg(test)]
    pub(crate) const fn step(&self) -> u32 {
        self.step
    }
}
