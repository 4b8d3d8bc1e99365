//! Filepath: src/tree/fine_grained.rs
//!
//! [`FineGrainedLockTree`]: per-node locks with hand-over-hand descent.
//!
//! # Locking Protocol
//!
//! 1. Phase one: lock the head, then the root node.
//! 2. Phase two: descend. At every step the child is locked before the
//!    grandparent is released, so at most three locks are held and they are
//!    always taken top-down. The head counts as the root's parent and is
//!    released together with it once the descent moves below the root.
//! 3. The descent stops at the node holding the key, or at the node whose
//!    child link for the key is empty. That node (or the head) and its parent
//!    stay locked for the terminal action.

use std::fmt as StdFmt;

use parking_lot::MutexGuard;

use crate::arena::{NodeRef, Side};
use crate::nodeversion::LockGuard;
use crate::tracing_helpers::error_log;

use super::ConcurrentMap;
use super::cursor::{Cursor, ParentLock};
use super::linked::LinkedTree;

/// Binary search tree with one lock per node, traversed by lock coupling.
///
/// Writers on disjoint subtrees proceed in parallel; any two operations whose
/// paths share a prefix serialize on that prefix.
///
/// ```rust
/// use syncds::{ConcurrentMap, FineGrainedLockTree};
///
/// let tree: FineGrainedLockTree<&str, u32> = FineGrainedLockTree::new();
/// tree.insert("b", 2);
/// tree.insert("a", 1);
/// tree.insert("b", 20);
///
/// assert_eq!(tree.find(&"b"), Some(20));
/// assert_eq!(tree.find(&"c"), None);
/// ```
pub struct FineGrainedLockTree<K, V> {
    tree: LinkedTree<K, V>,
}

/// Outcome of phase one.
enum RootPhase<'t> {
    /// Empty tree: only the head is held.
    Empty(MutexGuard<'t, ()>),

    /// Head and root node held.
    Locked(MutexGuard<'t, ()>, NodeRef, LockGuard<'t>),
}

impl<K, V> FineGrainedLockTree<K, V> {
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

    fn lock_root(&self) -> RootPhase<'_> {
        let head: MutexGuard<'_, ()> = self.tree.lock_head();
        let root: NodeRef = self.tree.root();

        if root.is_nil() {
            return RootPhase::Empty(head);
        }

        let lock: LockGuard<'_> = self.tree.arena.slot(root).version().lock();
        RootPhase::Locked(head, root, lock)
    }
}

impl<K: Ord, V> FineGrainedLockTree<K, V> {
    /// Lock-coupled descent to the terminal position of `key`.
    fn locate(&self, key: &K) -> Cursor<'_, K, V> {
        let arena = &self.tree.arena;

        let (mut parent, mut node, mut lock) = match self.lock_root() {
            RootPhase::Empty(head) => {
                return Cursor::new(&self.tree, ParentLock::Head(head), None);
            }
            RootPhase::Locked(head, root, lock) => (ParentLock::Head(head), root, lock),
        };

        loop {
            let slot = arena.slot(node);
            let Some(ord) = slot.entry_locked(&lock).map(|entry| key.cmp(&entry.key)) else {
                error_log!(node = ?node, "reached a linked node without an entry");
                panic!("lock-coupled descent reached {node:?} without an entry");
            };

            let Some(side) = Side::of(ord) else {
                return Cursor::new(&self.tree, parent, Some((node, lock)));
            };

            let child: NodeRef = slot.child(side);
            if child.is_nil() {
                // `parent` (the grandparent of the attach point) drops on return.
                return Cursor::new(&self.tree, ParentLock::Node(node, lock), None);
            }

            let child_lock: LockGuard<'_> = arena.slot(child).version().lock();
            parent = ParentLock::Node(node, lock);
            node = child;
            lock = child_lock;
        }
    }
}

impl<K, V> ConcurrentMap<K, V> for FineGrainedLockTree<K, V>
where
    K: Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    fn insert(&self, key: K, value: V) {
        let guard = self.tree.arena.guard();
        self.locate(&key).insert(key, value, &guard);
    }

    fn find(&self, key: &K) -> Option<V> {
        self.locate(key).value()
    }

    fn remove(&self, key: &K) {
        let guard = self.tree.arena.guard();
        self.locate(key).remove(&guard);
    }

    fn is_valid(&self) -> bool {
        self.tree.is_valid()
    }
}

impl<K, V> Default for FineGrainedLockTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StdFmt::Debug for FineGrainedLockTree<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("FineGrainedLockTree")
            .field("tree", &self.tree)
            .finish()
    }
}
