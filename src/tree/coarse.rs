//! [`CoarseLockTree`]: a sequential BST behind a single mutex.

use std::cmp::Ordering;
use std::fmt as StdFmt;

use parking_lot::Mutex;

use super::ConcurrentMap;

type Link<K, V> = Option<Box<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn leaf(key: K, value: V) -> Box<Self> {
        Box::new(Self {
            key,
            value,
            left: None,
            right: None,
        })
    }
}

/// Binary search tree where every operation holds one tree-wide lock.
///
/// The baseline the per-node variants are measured against. Operations are
/// iterative, so degenerate (sorted-insert) trees do not grow the call stack.
pub struct CoarseLockTree<K, V> {
    root: Mutex<Link<K, V>>,
}

impl<K, V> CoarseLockTree<K, V> {
    /// Create an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: Mutex::new(None),
        }
    }
}

/// Follow `key` from `link` to the link that holds it, or to the empty link
/// where it would be attached.
fn seek<'a, K: Ord, V>(mut link: &'a mut Link<K, V>, key: &K) -> &'a mut Link<K, V> {
    loop {
        // Shared borrow only; it ends before the mutable step below.
        let ord: Ordering = match link.as_deref() {
            Some(node) => key.cmp(&node.key),
            None => return link,
        };
        if ord == Ordering::Equal {
            return link;
        }

        // No guard: the mutable reborrow exists only inside the `Some` arm.
        match link {
            Some(node) => {
                link = if ord == Ordering::Less {
                    &mut node.left
                } else {
                    &mut node.right
                };
            }
            None => return link,
        }
    }
}

/// Detach the minimum of the subtree at `link` and return its entry.
fn take_min<K, V>(mut link: &mut Link<K, V>) -> Option<(K, V)> {
    while link.as_deref().is_some_and(|node| node.left.is_some()) {
        let Some(node) = link.as_deref_mut() else {
            return None;
        };
        link = &mut node.left;
    }

    let mut node: Box<Node<K, V>> = link.take()?;
    *link = node.right.take();
    Some((node.key, node.value))
}

impl<K, V> ConcurrentMap<K, V> for CoarseLockTree<K, V>
where
    K: Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    fn insert(&self, key: K, value: V) {
        let mut root = self.root.lock();
        let link: &mut Link<K, V> = seek(&mut root, &key);

        match link {
            Some(node) => node.value = value,
            None => *link = Some(Node::leaf(key, value)),
        }
    }

    fn find(&self, key: &K) -> Option<V> {
        let root = self.root.lock();
        let mut cursor: Option<&Node<K, V>> = root.as_deref();

        while let Some(node) = cursor {
            cursor = match key.cmp(&node.key) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(node.value.clone()),
            };
        }
        None
    }

    fn remove(&self, key: &K) {
        let mut root = self.root.lock();
        let link: &mut Link<K, V> = seek(&mut root, key);

        let Some(node) = link else {
            return;
        };

        if node.left.is_some() && node.right.is_some() {
            if let Some((succ_key, succ_value)) = take_min(&mut node.right) {
                node.key = succ_key;
                node.value = succ_value;
            }
            return;
        }

        if let Some(mut node) = link.take() {
            *link = node.left.take().or_else(|| node.right.take());
        }
    }

    fn is_valid(&self) -> bool {
        let root = self.root.lock();
        let mut pending: Vec<(&Node<K, V>, Option<&K>, Option<&K>)> = Vec::new();
        pending.extend(root.as_deref().map(|node| (node, None, None)));

        while let Some((node, low, high)) = pending.pop() {
            if low.is_some_and(|low| node.key <= *low) || high.is_some_and(|high| node.key >= *high) {
                return false;
            }
            if let Some(left) = node.left.as_deref() {
                pending.push((left, low, Some(&node.key)));
            }
            if let Some(right) = node.right.as_deref() {
                pending.push((right, Some(&node.key), high));
            }
        }
        true
    }
}

impl<K, V> Default for CoarseLockTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StdFmt::Debug for CoarseLockTree<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("CoarseLockTree")
            .field("locked", &self.root.is_locked())
            .finish_non_exhaustive()
    }
}

impl<K, V> Drop for CoarseLockTree<K, V> {
    fn drop(&mut self) {
        // Iterative teardown; the default recursive drop overflows on a spine.
        let mut pending: Vec<Box<Node<K, V>>> = self.root.get_mut().take().into_iter().collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.left.take());
            pending.extend(node.right.take());
        }
    }
}
