//! Filepath: src/stack.rs
//!
//! Concurrent LIFO stacks.
//!
//! Both variants are built on the same single-attempt CAS primitive,
//! [`TreiberHead`]:
//!
//! - [`LockFreeStack`] retries the CAS until it succeeds.
//! - [`BackoffEliminationStack`] reacts to a failed CAS by visiting a random
//!   [`Exchanger`] of an [`EliminationArray`], where a concurrent push and pop
//!   can complete each other without touching the head.

use std::fmt as StdFmt;

mod elimination;
mod exchanger;
mod treiber;

#[cfg(loom)]
mod loom_tests;


pub use elimination::{BackoffEliminationStack, EliminationArray};
pub use exchanger::{ExchangeTimeout, Exchanger};
pub use treiber::{LockFreeStack, TreiberHead, TryPop};

// ============================================================================
//  StackError
// ============================================================================

/// Errors returned by stack operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// `pop` found no element.
    EmptyStack,
}

impl StdFmt::Display for StackError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::EmptyStack => write!(f, "stack is empty"),
        }
    }
}

impl std::error::Error for StackError {}

// ============================================================================
//  ConcurrentStack
// ============================================================================

/// Operation contract shared by every stack variant.
///
/// ```rust
/// use syncds::{ConcurrentStack, LockFreeStack, StackError};
///
/// let stack = LockFreeStack::new();
/// stack.push(5);
/// stack.push(20);
/// stack.push(10);
///
/// assert_eq!(stack.peek(), 10);
/// assert_eq!(stack.pop(), Ok(10));
/// assert_eq!(stack.pop(), Ok(20));
/// assert_eq!(stack.pop(), Ok(5));
/// assert_eq!(stack.pop(), Err(StackError::EmptyStack));
/// ```
pub trait ConcurrentStack<T>: Send + Sync {
    /// Push `value` on top.
    fn push(&self, value: T);

    /// Remove and return the top element.
    ///
    /// # Errors
    ///
    /// [`StackError::EmptyStack`] when the stack had no element at the
    /// linearization point.
    fn pop(&self) -> Result<T, StackError>;

    /// Copy of the top element, or `T::default()` when the stack is empty.
    ///
    /// An empty stack cannot be told apart from one whose top equals the
    /// default value.
    fn peek(&self) -> T
    where
        T: Copy + Default;

    /// Number of elements. Only a snapshot while other threads are active.
    fn len(&self) -> usize;

    /// `true` when [`len`](Self::len) is zero.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
