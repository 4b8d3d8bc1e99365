//! Arena-backed tree core shared by the fine-grained and optimistic variants.
//!
//! Holds the node arena, the root link and the head lock that guards root
//! replacement. Also hosts the two unsynchronized walks: the key search used
//! for optimistic discovery and validation, and the whole-tree ordering check.

use std::fmt as StdFmt;
use std::sync::atomic::AtomicU64;

use parking_lot::{Mutex, MutexGuard};
use seize::LocalGuard;

use crate::arena::{NodeArena, NodeRef, Side};
use crate::ordering::{READ_ORD, WRITE_ORD};

/// Arena, root link and head lock.
pub(crate) struct LinkedTree<K, V> {
    pub(crate) arena: NodeArena<K, V>,

    /// Root node, or `NodeRef::NIL` when the tree is empty.
    root: AtomicU64,

    /// Parent lock of the root position.
    head: Mutex<()>,
}

impl<K, V> LinkedTree<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            arena: NodeArena::new(),
            root: AtomicU64::new(NodeRef::NIL.to_bits()),
            head: Mutex::new(()),
        }
    }

    #[inline]
    pub(crate) fn root(&self) -> NodeRef {
        NodeRef::from_bits(self.root.load(READ_ORD))
    }

    /// Replace the root. The head guard is the proof that the caller owns the
    /// root position.
    #[inline]
    pub(crate) fn set_root(&self, _head: &MutexGuard<'_, ()>, node: NodeRef) {
        self.root.store(node.to_bits(), WRITE_ORD);
    }

    #[inline]
    pub(crate) fn lock_head(&self) -> MutexGuard<'_, ()> {
        self.head.lock()
    }
}

impl<K: Ord, V> LinkedTree<K, V> {
    /// Walk from the root without taking any lock.
    ///
    /// Returns `(parent, node)` where `node` holds `key` or is the `NIL`
    /// position where it would be attached, and `parent` is `NIL` when `node`
    /// is the root position. Returns `None` when the walk ran into a slot that
    /// is being recycled, or looped longer than the arena has slots; the
    /// caller restarts in both cases.
    pub(crate) fn search(&self, key: &K, guard: &LocalGuard<'_>) -> Option<(NodeRef, NodeRef)> {
        let mut parent: NodeRef = NodeRef::NIL;
        let mut node: NodeRef = self.root();
        let mut steps: usize = 0;

        while !node.is_nil() {
            steps += 1;
            if steps > self.arena.allocated() {
                return None;
            }

            let slot = self.arena.slot(node);
            let entry = slot.entry_protected(guard)?;

            let Some(side) = Side::of(key.cmp(&entry.key)) else {
                break;
            };

            parent = node;
            node = slot.child(side);
        }

        Some((parent, node))
    }

    /// Unsynchronized strict-ordering check over the whole tree.
    ///
    /// Every key must lie strictly between the bounds inherited from its
    /// ancestors, which also rules out duplicates.
    pub(crate) fn is_valid(&self) -> bool {
        let guard = self.arena.guard();
        let mut pending: Vec<(NodeRef, Option<&K>, Option<&K>)> = vec![(self.root(), None, None)];
        let mut visited: usize = 0;

        while let Some((node, low, high)) = pending.pop() {
            if node.is_nil() {
                continue;
            }

            visited += 1;
            if visited > self.arena.allocated() {
                return false;
            }

            let slot = self.arena.slot(node);
            let Some(entry) = slot.entry_protected(&guard) else {
                return false;
            };

            let key: &K = &entry.key;
            if low.is_some_and(|low| key <= low) || high.is_some_and(|high| key >= high) {
                return false;
            }

            pending.push((slot.child(Side::Left), low, Some(key)));
            pending.push((slot.child(Side::Right), Some(key), high));
        }

        true
    }
}

impl<K, V> StdFmt::Debug for LinkedTree<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("LinkedTree")
            .field("root", &self.root())
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}
