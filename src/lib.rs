//! # `syncds`
//!
//! Concurrent ordered maps and stacks under interchangeable synchronization
//! strategies.
//!
//! Every tree implements [`ConcurrentMap`] and every stack implements
//! [`ConcurrentStack`]; the variants only differ in how they synchronize:
//!
//! | Type | Discipline | Blocking |
//! |------|------------|----------|
//! | [`CoarseLockTree`] | one mutex around the tree | whole tree |
//! | [`FineGrainedLockTree`] | per-node locks, lock coupling | path prefix |
//! | [`OptimisticLockTree`] | unlocked descent, validated terminal locks | terminal pair |
//! | [`LockFreeStack`] | Treiber CAS on the head | never |
//! | [`BackoffEliminationStack`] | Treiber CAS plus elimination array | never |
//!
//! ## Thread Safety
//!
//! All structures are `Send + Sync` when their keys and values are, and every
//! operation takes `&self`:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use syncds::{BackoffEliminationStack, ConcurrentStack};
//!
//! let stack = Arc::new(BackoffEliminationStack::new());
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let stack = Arc::clone(&stack);
//!         thread::spawn(move || stack.push(t))
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert_eq!(stack.len(), 4);
//! ```
//!
//! ## Memory Reclamation
//!
//! - Tree nodes of the per-node-locked variants live in a
//!   [`NodeArena`](arena::NodeArena) and are recycled through a free list.
//!   Slot generations make a recycled slot distinguishable from the node that
//!   used to live there.
//! - Replaced tree entries and popped stack nodes are retired through `seize`,
//!   so unsynchronized readers never touch freed memory.
//!
//! ## Limitations
//!
//! - Trees are unbalanced; sorted insertion produces a linked list.
//! - [`ConcurrentStack::peek`] returns `T::default()` on an empty stack.
//! - The optimistic tree retries without bound under contention.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// We use extensive benchmarking to verify #[inline(always)] placement is correct.
#![allow(clippy::inline_always)]

pub mod arena;
pub mod config;
pub mod nodeversion;
pub mod ordering;
pub mod stack;
pub mod tree;

mod backoff;
mod tagged;
mod tracing_helpers;

// Re-export main types for convenience
pub use config::EliminationConfig;
pub use stack::{BackoffEliminationStack, ConcurrentStack, LockFreeStack, StackError};
pub use tree::{CoarseLockTree, ConcurrentMap, FineGrainedLockTree, OptimisticLockTree};
