//! Standard memory orderings for concurrent node access.
//!
//! These constants keep ordering usage consistent across the trees, the stacks
//! and the exchanger, and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading links and entries during unsynchronized traversal.
/// Pairs with writer's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing links and entries under a node lock.
/// Pairs with reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for CAS success (stack head, exchanger slot, arena chunk install).
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Ordering for CAS failure.
/// Only need to see the current value.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for relaxed loads (within a locked region, or pure counters).
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Ordering for reading a node version before comparing generations.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Ordering for version unlock (clear lock bit, maybe bump generation).
/// Must be visible to the next locker.
pub const UNLOCK_ORD: Ordering = Ordering::Release;
