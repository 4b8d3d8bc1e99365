//! Filepath: src/tree.rs
//!
//! Concurrent unbalanced binary search trees.
//!
//! Three variants share the [`ConcurrentMap`] contract and differ only in how
//! they synchronize:
//!
//! | Type | Discipline |
//! |------|------------|
//! | [`CoarseLockTree`] | one mutex around the whole tree |
//! | [`FineGrainedLockTree`] | per-node locks, hand-over-hand descent |
//! | [`OptimisticLockTree`] | unlocked descent, lock the terminal pair, re-walk to validate |
//!
//! The two per-node variants keep their nodes in a [`NodeArena`](crate::arena::NodeArena)
//! and share the locked terminal actions (attach, overwrite, splice, successor
//! promotion) in `cursor`. They only differ in how the cursor is obtained.

mod coarse;
mod cursor;
mod fine_grained;
mod linked;
mod optimistic;

pub use coarse::CoarseLockTree;
pub use fine_grained::FineGrainedLockTree;
pub use optimistic::OptimisticLockTree;

// ============================================================================
//  ConcurrentMap
// ============================================================================

/// Operation contract shared by every tree variant.
///
/// All operations take `&self` and may be called from any number of threads.
/// Each call takes effect atomically with respect to the others.
///
/// ```rust
/// use syncds::{ConcurrentMap, OptimisticLockTree};
///
/// let tree = OptimisticLockTree::new();
/// tree.insert(5, 50);
/// tree.insert(3, 30);
/// tree.insert(8, 80);
/// tree.remove(&5);
///
/// assert_eq!(tree.find(&5), None);
/// assert_eq!(tree.find(&3), Some(30));
/// assert!(tree.is_valid());
/// ```
pub trait ConcurrentMap<K: Ord, V>: Send + Sync {
    /// Insert `key`, or overwrite its value if it is already present.
    fn insert(&self, key: K, value: V);

    /// Value currently mapped to `key`.
    fn find(&self, key: &K) -> Option<V>;

    /// Remove `key`. Removing an absent key is a no-op.
    fn remove(&self, key: &K);

    /// Check the strict BST ordering of the whole tree.
    ///
    /// Only [`CoarseLockTree`] synchronizes this check; for the other variants
    /// the answer is meaningful once concurrent writers have quiesced.
    fn is_valid(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<M: ConcurrentMap<u32, u32> + Default>() {
        let map = M::default();
        assert_eq!(map.find(&1), None);
        assert!(map.is_valid());

        for key in [50, 30, 70, 20, 40, 60, 80] {
            map.insert(key, key * 10);
            assert!(map.is_valid());
        }
        map.insert(40, 4000);
        assert_eq!(map.find(&40), Some(4000));

        map.remove(&50);
        map.remove(&50);
        map.remove(&99);
        assert!(map.is_valid());
        assert_eq!(map.find(&50), None);
        for key in [20, 30, 60, 70, 80] {
            assert_eq!(map.find(&key), Some(key * 10));
        }
    }

    #[test]
    fn coarse_contract() {
        exercise::<CoarseLockTree<u32, u32>>();
    }

    #[test]
    fn fine_grained_contract() {
        exercise::<FineGrainedLockTree<u32, u32>>();
    }

    #[test]
    fn optimistic_contract() {
        exercise::<OptimisticLockTree<u32, u32>>();
    }
}
