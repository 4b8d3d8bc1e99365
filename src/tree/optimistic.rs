//! Filepath: src/tree/optimistic.rs
//!
//! [`OptimisticLockTree`]: unlocked descent, locked terminal pair, re-walk.
//!
//! # Protocol
//!
//! ```text
//! loop:
//!   1. search(key)            -> (parent, node)       no locks
//!   2. lock parent (or head)  -> same generation?     and still linking to node?
//!   3. lock node (if any)     -> still holding key?
//!   4. search(key) again      -> same (parent, node)?
//!   5. all checks pass        -> cursor, else unlock + backoff + retry
//! ```
//!
//! Step 2 checks the parent before any second lock is taken. A parent slot
//! that was recycled deeper in the tree is therefore never held while waiting
//! for another lock, which keeps acquisition top-down along live links.
//!
//! Retries are unbounded. Under sustained contention on the same path an
//! operation can keep failing validation; [`Backoff`] spaces the attempts out.

use std::fmt as StdFmt;

use seize::LocalGuard;

use crate::arena::{NodeRef, Side};
use crate::backoff::Backoff;
use crate::nodeversion::LockGuard;
use crate::tracing_helpers::{trace_log, warn_log};

use super::ConcurrentMap;
use super::cursor::{Cursor, ParentLock};
use super::linked::LinkedTree;

/// Binary search tree with optimistic descent and validated terminal locks.
///
/// Readers and writers only lock the two nodes at the end of their path, so
/// disjoint operations never touch the same lock.
///
/// ```rust
/// use syncds::{ConcurrentMap, OptimisticLockTree};
/// use std::sync::Arc;
/// use std::thread;
///
/// let tree = Arc::new(OptimisticLockTree::new());
/// let handles: Vec<_> = (0..4u64)
///     .map(|t| {
///         let tree = Arc::clone(&tree);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 tree.insert(t * 1000 + i, i);
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert!(tree.is_valid());
/// assert_eq!(tree.find(&3042), Some(42));
/// ```
pub struct OptimisticLockTree<K, V> {
    tree: LinkedTree<K, V>,
}

impl<K, V> OptimisticLockTree<K, V> {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: LinkedTree::new(),
        }
    }

    /// Slots ever handed out by the node arena.
    #[must_use]
    pub fn allocated_nodes(&self) -> usize {
        self.tree.arena.allocated()
    }

    /// Slots released by removals and waiting for reuse.
    #[must_use]
    pub fn free_nodes(&self) -> usize {
        self.tree.arena.free_slots()
    }
}

/// Failed validations between two livelock warnings.
const LIVELOCK_REPORT_EVERY: u64 = 10_000;

impl<K: Ord, V> OptimisticLockTree<K, V> {
    /// Retry [`Self::try_locate`] until it validates.
    fn locate<'t>(&'t self, key: &K, guard: &LocalGuard<'_>) -> Cursor<'t, K, V> {
        let mut backoff = Backoff::new();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;

            if let Some(cursor) = self.try_locate(key, guard) {
                return cursor;
            }

            trace_log!(attempts, "optimistic validation failed, restarting descent");
            if attempts % LIVELOCK_REPORT_EVERY == 0 {
                warn_log!(attempts, "optimistic descent keeps failing validation");
            }
            backoff.snooze();
        }
    }

    /// One optimistic attempt. `None` means some check failed and every lock
    /// taken so far has been released.
    fn try_locate<'t>(&'t self, key: &K, guard: &LocalGuard<'_>) -> Option<Cursor<'t, K, V>> {
        let arena = &self.tree.arena;
        let (parent, node) = self.tree.search(key, guard)?;

        let parent_lock: ParentLock<'t> = if parent.is_nil() {
            let head = self.tree.lock_head();
            if self.tree.root() != node {
                return None;
            }
            ParentLock::Head(head)
        } else {
            let slot = arena.slot(parent);
            let lock: LockGuard<'t> = slot.version().lock();
            if lock.generation() != parent.generation() {
                return None;
            }

            let side: Side = slot
                .entry_locked(&lock)
                .and_then(|entry| Side::of(key.cmp(&entry.key)))?;
            if slot.child(side) != node {
                return None;
            }
            ParentLock::Node(parent, lock)
        };

        let node_lock: Option<(NodeRef, LockGuard<'t>)> = if node.is_nil() {
            None
        } else {
            let slot = arena.slot(node);
            let lock: LockGuard<'t> = slot.version().lock();
            debug_assert_eq!(lock.generation(), node.generation(), "child of a locked parent moved");

            let holds_key: bool = slot
                .entry_locked(&lock)
                .is_some_and(|entry| entry.key == *key);
            if !holds_key {
                return None;
            }
            Some((node, lock))
        };

        if self.tree.search(key, guard) != Some((parent, node)) {
            return None;
        }

        Some(Cursor::new(&self.tree, parent_lock, node_lock))
    }
}

impl<K, V> ConcurrentMap<K, V> for OptimisticLockTree<K, V>
where
    K: Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    fn insert(&self, key: K, value: V) {
        let guard = self.tree.arena.guard();
        self.locate(&key, &guard).insert(key, value, &guard);
    }

    fn find(&self, key: &K) -> Option<V> {
        let guard = self.tree.arena.guard();
        self.locate(key, &guard).value()
    }

    fn remove(&self, key: &K) {
        let guard = self.tree.arena.guard();
        self.locate(key, &guard).remove(&guard);
    }

    fn is_valid(&self) -> bool {
        self.tree.is_valid()
    }
}

impl<K, V> Default for OptimisticLockTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StdFmt::Debug for OptimisticLockTree<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("OptimisticLockTree")
            .field("tree", &self.tree)
            .finish()
    }
}
