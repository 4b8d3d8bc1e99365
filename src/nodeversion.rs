//! Filepath: src/nodeversion.rs
//!
//! Versioned per-node lock for the arena-backed trees.
//!
//! [`NodeVersion`] combines the lock bit and the slot's reuse generation in a
//! single `u32`. Lock-coupling descents only use the lock; optimistic descents
//! also compare generations, so a slot that was unlinked (and possibly reused
//! for an unrelated key) is never mistaken for the node that was observed.
//!
//! # Concurrency Model
//! 1. Readers: read [`NodeVersion::generation()`] and compare it to the
//!    generation carried by a [`NodeRef`](crate::arena::NodeRef).
//! 2. Writers: call `lock()` to get a [`LockGuard`], modify the node, let the
//!    guard drop. A writer that unlinks the node calls
//!    [`LockGuard::mark_unlinked()`] first; the generation is bumped in the
//!    same store that releases the lock.
//!
//! # Type-State Pattern
//! The [`LockGuard`] type provides compile-time evidence that the lock is held.
//! Arena writes take `&LockGuard` as proof. The guard unlocks on drop
//! (panic-safe).
//!
//! ```rust
//! use syncds::nodeversion::NodeVersion;
//!
//! let version = NodeVersion::new();
//! let before = version.generation();
//! {
//!     let mut guard = version.lock();
//!     guard.mark_unlinked();
//! }
//! assert_ne!(version.generation(), before);
//! ```

use std::marker::PhantomData;
use std::sync::atomic::AtomicU32;

use crate::backoff::Backoff;
use crate::ordering::{CAS_FAILURE, RELAXED, UNLOCK_ORD, VERSION_ORD};

// ============================================================================
//  Bit Constants
// ============================================================================

/// Lock bit: node is locked for modification.
const LOCK_BIT: u32 = 1 << 0;

/// Unlinked bit: set by the writer that detaches the node, only while locked.
const UNLINKED_BIT: u32 = 1 << 1;

/// Shift of the generation counter.
const GEN_SHIFT: u32 = 2;

/// Low bit of the generation counter.
const GEN_LOWBIT: u32 = 1 << GEN_SHIFT;

/// Largest generation value (30 bits).
pub const MAX_GENERATION: u32 = u32::MAX >> GEN_SHIFT;

/// Mask applied on unlock: clears lock and unlinked bits.
const UNLOCK_MASK: u32 = !(LOCK_BIT | UNLINKED_BIT);

// ============================================================================
//  NodeVersion
// ============================================================================

/// A versioned spin lock for arena slots.
///
/// # Layout
/// Bits 2-31: `generation` | Bit 1: `unlinked` | Bit 0: `locked`
///
/// The generation wraps after 2^30 unlinks of the same slot. A stale
/// [`NodeRef`](crate::arena::NodeRef) would have to be held across that many
/// reuses to be confused with a live one.
#[derive(Debug)]
pub struct NodeVersion {
    value: AtomicU32,
}

// ============================================================================
//  LockGuard (Type-State Pattern)
// ============================================================================

/// Zero-sized proof that a node lock is held.
///
/// Cannot be constructed except by [`NodeVersion::lock()`] or
/// [`NodeVersion::try_lock()`]. The lock is released when the guard drops.
///
/// # Thread Safety
/// Guards are `!Send` and `!Sync` via `PhantomData<*mut ()>`: a lock-coupled
/// descent must release every lock on the thread that took it.
#[derive(Debug)]
#[must_use = "releasing a lock without using the guard is a logic error"]
pub struct LockGuard<'a> {
    version: &'a NodeVersion,
    locked_value: u32,
    _marker: PhantomData<*mut ()>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // An unlinked node gets a fresh generation in the releasing store, so
        // the next locker can already tell the node is gone.
        let new_value: u32 = if self.locked_value & UNLINKED_BIT != 0 {
            self.locked_value.wrapping_add(GEN_LOWBIT) & UNLOCK_MASK
        } else {
            self.locked_value & UNLOCK_MASK
        };

        self.version.value.store(new_value, UNLOCK_ORD);
    }
}

impl LockGuard<'_> {
    /// Get the locked version value.
    #[inline]
    #[must_use]
    pub const fn locked_value(&self) -> u32 {
        self.locked_value
    }

    /// Generation of the node at the time the lock was taken.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.locked_value >> GEN_SHIFT
    }

    /// `true` if this guard locks `version`.
    #[inline]
    #[must_use]
    pub fn guards(&self, version: &NodeVersion) -> bool {
        std::ptr::eq(self.version, version)
    }

    /// Mark the node as detached from the tree.
    ///
    /// The generation is incremented when the guard drops.
    #[inline]
    pub fn mark_unlinked(&mut self) {
        // INVARIANT: lock is held, so no concurrent modifications possible.
        let new_value: u32 = self.locked_value | UNLINKED_BIT;
        self.version.value.store(new_value, UNLOCK_ORD);
        self.locked_value = new_value;
    }
}

impl NodeVersion {
    /// Create an unlocked version at generation 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU32::new(0),
        }
    }

    /// Create a node version from a raw value.
    ///
    ///  WARN: ONLY FOR TESTING.
    #[must_use]
    pub const fn from_value(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// Check if this node is locked.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        (self.value.load(RELAXED) & LOCK_BIT) != 0
    }

    /// Check if the current holder is detaching this node.
    #[inline]
    #[must_use]
    pub fn is_unlinked(&self) -> bool {
        (self.value.load(RELAXED) & UNLINKED_BIT) != 0
    }

    /// Get the raw version value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value.load(RELAXED)
    }

    /// Current generation of the slot.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.value.load(VERSION_ORD) >> GEN_SHIFT
    }

    // ========================================================================
    // Lock Operations (Type-State Pattern)
    // ========================================================================

    /// Acquire the lock, spinning (then yielding) while it is held elsewhere.
    #[must_use = "releasing a lock without using the guard is a logic error"]
    pub fn lock(&self) -> LockGuard<'_> {
        let mut backoff = Backoff::new();

        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            backoff.snooze();
        }
    }

    /// Try to acquire the lock without blocking.
    ///
    /// # Returns
    /// `Some(guard)` if the lock was acquired, `None` if it is held.
    #[must_use]
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        let value: u32 = self.value.load(RELAXED);

        if value & LOCK_BIT != 0 {
            return None;
        }

        let locked: u32 = value | LOCK_BIT;

        self.value
            .compare_exchange(value, locked, VERSION_ORD, CAS_FAILURE)
            .ok()
            .map(|_| LockGuard {
                version: self,
                locked_value: locked,
                _marker: PhantomData,
            })
    }
}

impl Default for NodeVersion {
    fn default() -> Self {
        Self::new()
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unlocked_generation_zero() {
        let v = NodeVersion::new();
        assert!(!v.is_locked());
        assert!(!v.is_unlinked());
        assert_eq!(v.generation(), 0);
    }

    #[test]
    fn test_lock_unlock_roundtrip() {
        let v = NodeVersion::new();
        let before: u32 = v.generation();

        {
            let guard: LockGuard<'_> = v.lock();
            assert!(v.is_locked());
            assert_eq!(guard.locked_value() & LOCK_BIT, LOCK_BIT);
            assert!(guard.guards(&v));
        }

        assert!(!v.is_locked());
        assert_eq!(v.generation(), before, "plain unlock keeps the generation");
    }

    #[test]
    fn test_try_lock() {
        let v = NodeVersion::new();

        let guard: Option<LockGuard<'_>> = v.try_lock();
        assert!(guard.is_some());
        assert!(v.is_locked());

        let second: Option<LockGuard<'_>> = v.try_lock();
        assert!(second.is_none());

        drop(guard);
        assert!(!v.is_locked());
    }

    #[test]
    fn test_unlink_bumps_generation_on_release() {
        let v = NodeVersion::new();

        {
            let mut guard: LockGuard<'_> = v.lock();
            guard.mark_unlinked();

            assert!(v.is_unlinked());
            // Still the old generation while the lock is held.
            assert_eq!(v.generation(), 0);
        }

        assert!(!v.is_locked());
        assert!(!v.is_unlinked(), "unlinked bit is transient");
        assert_eq!(v.generation(), 1);
    }

    #[test]
    fn test_guard_generation_matches_version() {
        let v = NodeVersion::from_value(7 << GEN_SHIFT);
        let guard = v.lock();
        assert_eq!(guard.generation(), 7);
    }

    #[test]
    fn test_generation_wraps() {
        let v = NodeVersion::from_value(MAX_GENERATION << GEN_SHIFT);

        {
            let mut guard = v.lock();
            guard.mark_unlinked();
        }

        assert_eq!(v.generation(), 0);
        assert!(!v.is_locked());
    }

    #[test]
    fn test_guards_rejects_other_version() {
        let a = NodeVersion::new();
        let b = NodeVersion::new();
        let guard = a.lock();
        assert!(!guard.guards(&b));
    }
}
