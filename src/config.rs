//! Tuning knobs for the elimination-backoff stack.

/// Exchangers in the elimination array unless configured otherwise.
pub const DEFAULT_ELIMINATION_CAPACITY: usize = 10;

/// Polling steps an exchanger spends waiting for a partner before giving up.
pub const DEFAULT_WAIT_STEPS: usize = 1000;

/// Elimination array sizing and exchange timeout.
///
/// Capacity trades collision probability against the chance that a pusher and
/// a popper pick the same slot. The wait budget bounds how long a thread stays
/// away from the shared stack once it has been contended out of its CAS.
///
/// ```rust
/// use syncds::config::EliminationConfig;
///
/// const WIDE: EliminationConfig = EliminationConfig::new(32, 200);
/// assert_eq!(WIDE.capacity(), 32);
/// assert_eq!(EliminationConfig::default().wait_steps(), 1000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EliminationConfig {
    capacity: usize,
    wait_steps: usize,
}

impl EliminationConfig {
    /// Build a configuration.
    ///
    /// # Panics
    ///
    /// Panics if either argument is zero (at compile time in const contexts).
    #[must_use]
    pub const fn new(capacity: usize, wait_steps: usize) -> Self {
        assert!(capacity > 0, "elimination array needs at least one exchanger");
        assert!(wait_steps > 0, "exchange wait budget must be positive");
        Self {
            capacity,
            wait_steps,
        }
    }

    /// Number of exchangers.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait budget per exchange, in polling steps.
    #[inline]
    #[must_use]
    pub const fn wait_steps(&self) -> usize {
        self.wait_steps
    }

    /// Same configuration with a different capacity.
    #[must_use]
    pub const fn with_capacity(self, capacity: usize) -> Self {
        Self::new(capacity, self.wait_steps)
    }

    /// Same configuration with a different wait budget.
    #[must_use]
    pub const fn with_wait_steps(self, wait_steps: usize) -> Self {
        Self::new(self.capacity, wait_steps)
    }
}

impl Default for EliminationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ELIMINATION_CAPACITY, DEFAULT_WAIT_STEPS)
    }
}
