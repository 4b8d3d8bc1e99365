//! Treiber stack: the shared head primitive and the plain lock-free stack.
//!
//! Nodes are published with a single CAS on the head. A popped node is
//! unlinked by the winning CAS, its value moved out, and the node itself
//! retired through `seize`: other threads that loaded it under a guard can
//! still read its `next` link, and an address cannot come back as a new head
//! while anyone might compare against it (no ABA).

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use seize::{Collector, Guard};

use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, RELAXED};

use super::{ConcurrentStack, StackError};

// ============================================================================
//  Node
// ============================================================================

pub(crate) struct Node<T> {
    /// Moved out by the popper; never dropped in place.
    value: ManuallyDrop<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn boxed(value: T) -> Box<Self> {
        Box::new(Self {
            value: ManuallyDrop::new(value),
            next: AtomicPtr::new(StdPtr::null_mut()),
        })
    }

    /// Take the value back out of an unpublished node.
    pub(crate) fn into_value(self: Box<Self>) -> T {
        ManuallyDrop::into_inner(self.value)
    }
}

/// Free a popped node (seize callback). The value was already moved out.
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` on a `Node<T>`.
/// - Must only be called after seize determines no reader remains.
unsafe fn reclaim_node_boxed<T>(ptr: *mut Node<T>, _collector: &Collector) {
    // SAFETY: Caller guarantees ptr is valid; ManuallyDrop skips the value.
    unsafe { drop(Box::from_raw(ptr)) };
}

// ============================================================================
//  TreiberHead
// ============================================================================

/// Result of a single [`TreiberHead::try_pop`] attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPop<T> {
    /// The CAS won; here is the former top.
    Popped(T),
    /// The head was null.
    Empty,
    /// Another thread changed the head between the load and the CAS.
    Contended,
}

/// Atomic head of a Treiber stack with single-attempt push and pop.
///
/// Retry policy is left to the caller, which is what lets the
/// elimination stack insert its fallback between attempts.
pub struct TreiberHead<T> {
    head: AtomicPtr<Node<T>>,
    collector: Collector,
    _marker: PhantomData<T>,
}

// SAFETY: values move between threads through push/pop.
unsafe impl<T: Send> Send for TreiberHead<T> {}
// SAFETY: values are moved out by exactly one popper; `peek` hands out copies
// read through shared references, hence `T: Sync`.
unsafe impl<T: Send + Sync> Sync for TreiberHead<T> {}

impl<T> TreiberHead<T> {
    /// Create an empty head.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(StdPtr::null_mut()),
            collector: Collector::new(),
            _marker: PhantomData,
        }
    }

    /// One push attempt. On a lost CAS the value is handed back.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when another thread moved the head first.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        self.try_push_node(Node::boxed(value)).map_err(Node::into_value)
    }

    /// One push attempt with an already allocated node, handed back on failure.
    pub(crate) fn try_push_node(&self, node: Box<Node<T>>) -> Result<(), Box<Node<T>>> {
        let head: *mut Node<T> = self.head.load(READ_ORD);
        node.next.store(head, RELAXED);

        let raw: *mut Node<T> = Box::into_raw(node);
        match self
            .head
            .compare_exchange(head, raw, CAS_SUCCESS, CAS_FAILURE)
        {
            Ok(_) => Ok(()),

            // SAFETY: the CAS failed, so `raw` was never published.
            Err(_) => Err(unsafe { Box::from_raw(raw) }),
        }
    }

    /// One pop attempt.
    pub fn try_pop(&self) -> TryPop<T> {
        let guard = self.collector.enter();
        let head: *mut Node<T> = guard.protect(&self.head, READ_ORD);

        if head.is_null() {
            return TryPop::Empty;
        }

        // SAFETY: `head` is protected by the guard, so the node is not freed.
        let next: *mut Node<T> = unsafe { (*head).next.load(READ_ORD) };

        if self
            .head
            .compare_exchange(head, next, CAS_SUCCESS, CAS_FAILURE)
            .is_err()
        {
            return TryPop::Contended;
        }

        // SAFETY: the winning CAS unlinked `head`; this thread is the only one
        // that moves its value out. Concurrent peekers only read through `&`.
        let value: T = unsafe { ManuallyDrop::into_inner(StdPtr::read(&raw const (*head).value)) };

        // SAFETY: `head` is unreachable from the stack now; readers that still
        // hold it are covered by their guards.
        unsafe { guard.defer_retire(head, reclaim_node_boxed::<T>) };

        TryPop::Popped(value)
    }

    /// Copy of the top value, if any.
    pub fn peek(&self) -> Option<T>
    where
        T: Copy,
    {
        let guard = self.collector.enter();
        let head: *mut Node<T> = guard.protect(&self.head, READ_ORD);

        // SAFETY: protected; a concurrent popper reads the value too but
        // never writes it.
        unsafe { head.as_ref().map(|node| *node.value) }
    }

    /// Walk the chain and count nodes.
    pub fn len(&self) -> usize {
        let guard = self.collector.enter();
        let mut count: usize = 0;
        let mut cursor: *mut Node<T> = guard.protect(&self.head, READ_ORD);

        // SAFETY: every node reached is protected by the guard.
        while let Some(node) = unsafe { cursor.as_ref() } {
            count += 1;
            cursor = guard.protect(&node.next, READ_ORD);
        }
        count
    }

    /// `true` if the head is null.
    pub fn is_empty(&self) -> bool {
        self.head.load(READ_ORD).is_null()
    }
}

impl<T> Default for TreiberHead<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StdFmt::Debug for TreiberHead<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("TreiberHead")
            .field("empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for TreiberHead<T> {
    fn drop(&mut self) {
        let mut cursor: *mut Node<T> = *self.head.get_mut();

        while !cursor.is_null() {
            // SAFETY: exclusive access; every linked node is a live Box whose
            // value was not moved out.
            let node: Box<Node<T>> = unsafe { Box::from_raw(cursor) };
            cursor = node.next.load(RELAXED);
            drop(node.into_value());
        }
        // `collector` drops next and frees the retired nodes.
    }
}

// ============================================================================
//  LockFreeStack
// ============================================================================

/// Treiber stack: CAS on the head, retried until it wins.
pub struct LockFreeStack<T> {
    head: TreiberHead<T>,
}

impl<T> LockFreeStack<T> {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: TreiberHead::new(),
        }
    }
}

impl<T: Send + Sync> ConcurrentStack<T> for LockFreeStack<T> {
    fn push(&self, value: T) {
        let mut node: Box<Node<T>> = Node::boxed(value);

        while let Err(back) = self.head.try_push_node(node) {
            node = back;
            std::hint::spin_loop();
        }
    }

    fn pop(&self) -> Result<T, StackError> {
        loop {
            match self.head.try_pop() {
                TryPop::Popped(value) => return Ok(value),
                TryPop::Empty => return Err(StackError::EmptyStack),
                TryPop::Contended => std::hint::spin_loop(),
            }
        }
    }

    fn peek(&self) -> T
    where
        T: Copy + Default,
    {
        self.head.peek().unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.head.len()
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StdFmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("LockFreeStack")
            .field("head", &self.head)
            .finish()
    }
}
