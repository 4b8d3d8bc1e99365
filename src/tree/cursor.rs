//! Locked terminal position and the actions performed on it.
//!
//! A [`Cursor`] is what both per-node-locked trees hand over once their
//! descent is done: the node holding the key (if any) and the parent of that
//! position, both locked. From here insert, find and remove are identical for
//! the two variants.

use std::ptr as StdPtr;

use parking_lot::MutexGuard;
use seize::LocalGuard;

use crate::arena::{Entry, NodeRef, Side};
use crate::nodeversion::LockGuard;
use crate::tracing_helpers::error_log;

use super::linked::LinkedTree;

/// Lock held on the parent of the terminal position.
pub(crate) enum ParentLock<'t> {
    /// The terminal position is the root.
    Head(MutexGuard<'t, ()>),

    /// The terminal position is a child link of this node.
    Node(NodeRef, LockGuard<'t>),
}

/// Terminal position of a descent, with every lock it needs held.
pub(crate) struct Cursor<'t, K, V> {
    tree: &'t LinkedTree<K, V>,
    parent: ParentLock<'t>,
    target: Option<(NodeRef, LockGuard<'t>)>,
}

impl<'t, K: Ord, V> Cursor<'t, K, V> {
    pub(crate) fn new(
        tree: &'t LinkedTree<K, V>,
        parent: ParentLock<'t>,
        target: Option<(NodeRef, LockGuard<'t>)>,
    ) -> Self {
        Self {
            tree,
            parent,
            target,
        }
    }

    /// Clone the value out of the locked target.
    pub(crate) fn value(&self) -> Option<V>
    where
        V: Clone,
    {
        let (node, lock) = self.target.as_ref()?;
        let slot = self.tree.arena.slot(*node);
        slot.entry_locked(lock).map(|entry| entry.value.clone())
    }

    /// Overwrite the target's entry, or attach a new leaf under the parent.
    pub(crate) fn insert(self, key: K, value: V, guard: &LocalGuard<'_>) {
        let arena = &self.tree.arena;

        if let Some((node, lock)) = &self.target {
            let fresh: *mut Entry<K, V> = Box::into_raw(Entry::boxed(key, value));
            let old: *mut Entry<K, V> = arena.slot(*node).swap_entry(lock, fresh);

            // SAFETY: `old` was the slot's entry until the swap above.
            unsafe { arena.retire_entry(old, guard) };
            return;
        }

        match &self.parent {
            ParentLock::Head(head) => {
                debug_assert!(self.tree.root().is_nil(), "root position is occupied");
                let node: NodeRef = arena.alloc(Entry::boxed(key, value));
                self.tree.set_root(head, node);
            }

            ParentLock::Node(parent, lock) => {
                let slot = arena.slot(*parent);
                let side: Option<Side> = slot
                    .entry_locked(lock)
                    .and_then(|entry| Side::of(key.cmp(&entry.key)));

                let Some(side) = side else {
                    error_log!(parent = ?parent, "attach point already holds the key");
                    panic!("attach point {parent:?} already holds the key being inserted");
                };

                debug_assert!(slot.child(side).is_nil(), "attach link is occupied");
                let node: NodeRef = arena.alloc(Entry::boxed(key, value));
                slot.set_child(lock, side, node);
            }
        }
    }

    /// Unlink the target. A no-op when the key was not found.
    ///
    /// A node with at most one child is spliced out. A node with two children
    /// takes over its in-order successor's entry and the successor is spliced
    /// out instead.
    pub(crate) fn remove(self, guard: &LocalGuard<'_>) {
        let Self {
            tree,
            parent,
            target,
        } = self;

        let Some((node, mut lock)) = target else {
            return;
        };

        let arena = &tree.arena;
        let slot = arena.slot(node);
        let left: NodeRef = slot.child(Side::Left);
        let right: NodeRef = slot.child(Side::Right);

        if !left.is_nil() && !right.is_nil() {
            promote_successor(tree, node, &lock, guard);
            return;
        }

        let child: NodeRef = if left.is_nil() { right } else { left };
        replace_child(tree, &parent, node, child);

        lock.mark_unlinked();
        let old: *mut Entry<K, V> = slot.swap_entry(&lock, StdPtr::null_mut());

        // SAFETY: the node is unlinked and its entry detached.
        unsafe { arena.retire_entry(old, guard) };

        drop(lock);
        arena.free(node);
        drop(parent);
    }
}

/// Point the parent's link at `old` to `new` instead.
fn replace_child<K, V>(tree: &LinkedTree<K, V>, parent: &ParentLock<'_>, old: NodeRef, new: NodeRef) {
    match parent {
        ParentLock::Head(head) => {
            debug_assert_eq!(tree.root(), old, "head lock held for a non-root node");
            tree.set_root(head, new);
        }

        ParentLock::Node(parent, lock) => {
            let slot = tree.arena.slot(*parent);
            let side: Side = if slot.child(Side::Left) == old {
                Side::Left
            } else if slot.child(Side::Right) == old {
                Side::Right
            } else {
                error_log!(parent = ?parent, child = ?old, "locked parent does not link to the target");
                panic!("locked parent {parent:?} does not link to {old:?}");
            };

            slot.set_child(lock, side, new);
        }
    }
}

/// Two-child removal: lock-couple down the left spine of the right subtree,
/// move the minimum's entry into `node` and splice the minimum out.
///
/// The caller holds `node` locked for the whole operation.
fn promote_successor<K, V>(
    tree: &LinkedTree<K, V>,
    node: NodeRef,
    node_lock: &LockGuard<'_>,
    guard: &LocalGuard<'_>,
) {
    let arena = &tree.arena;
    let slot = arena.slot(node);

    // `None` while the successor is still the right child of `node`.
    let mut above: Option<(NodeRef, LockGuard<'_>)> = None;
    let mut succ: NodeRef = slot.child(Side::Right);
    let mut succ_lock: LockGuard<'_> = arena.slot(succ).version().lock();

    loop {
        let next: NodeRef = arena.slot(succ).child(Side::Left);
        if next.is_nil() {
            break;
        }

        let next_lock: LockGuard<'_> = arena.slot(next).version().lock();
        // Releases the old grandparent only after the child is held.
        above = Some((succ, succ_lock));
        succ = next;
        succ_lock = next_lock;
    }

    // Move the entry before unlinking, so the successor's key stays reachable
    // at `node` for unsynchronized searches. A search that reaches the
    // emptied successor in between sees no entry and restarts.
    let succ_slot = arena.slot(succ);
    let moved: *mut Entry<K, V> = succ_slot.swap_entry(&succ_lock, StdPtr::null_mut());
    let old: *mut Entry<K, V> = slot.swap_entry(node_lock, moved);

    let succ_right: NodeRef = succ_slot.child(Side::Right);
    match &above {
        None => slot.set_child(node_lock, Side::Right, succ_right),
        Some((parent, parent_lock)) => {
            arena
                .slot(*parent)
                .set_child(parent_lock, Side::Left, succ_right);
        }
    }
    succ_lock.mark_unlinked();

    // SAFETY: `old` was replaced by the successor's entry; `moved` now belongs
    // to `node` alone.
    unsafe { arena.retire_entry(old, guard) };

    drop(succ_lock);
    arena.free(succ);
}
