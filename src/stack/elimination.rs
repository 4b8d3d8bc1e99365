//! Elimination array and the elimination-backoff stack built on it.
//!
//! When the head CAS of a [`TreiberHead`] fails, the stack is contended and
//! a concurrent opposite operation is likely. Instead of retrying the CAS
//! right away, the thread visits a random exchanger:
//!
//! | Pairing | Outcome |
//! |---------|---------|
//! | push / pop | both complete; the value never touches the shared chain |
//! | push / push | values swapped, both keep pushing (multiset unchanged) |
//! | pop / pop | nothing exchanged, both retry |
//! | timeout | own item back, retry the CAS |

use std::fmt as StdFmt;
use std::sync::atomic::AtomicUsize;

use rand::Rng;

use crate::config::EliminationConfig;
use crate::ordering::RELAXED;
use crate::tracing_helpers::{debug_log, error_log, trace_log};

use super::exchanger::{ExchangeTimeout, Exchanger};
use super::treiber::{Node, TreiberHead, TryPop};
use super::{ConcurrentStack, StackError};

// ============================================================================
//  EliminationArray
// ============================================================================

/// Fixed pool of exchangers; each visit picks one uniformly at random.
pub struct EliminationArray<T> {
    exchangers: Box<[Exchanger<T>]>,
    wait_steps: usize,
}

impl<T> EliminationArray<T> {
    /// Build an array with `config.capacity()` exchangers.
    #[must_use]
    pub fn new(config: EliminationConfig) -> Self {
        Self {
            exchangers: (0..config.capacity()).map(|_| Exchanger::new()).collect(),
            wait_steps: config.wait_steps(),
        }
    }

    /// Number of exchangers.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.exchangers.len()
    }

    /// Exchange `item` through a randomly chosen exchanger.
    ///
    /// # Errors
    ///
    /// [`ExchangeTimeout`] with the caller's item when nobody paired up.
    pub fn visit(&self, item: Option<T>) -> Result<Option<T>, ExchangeTimeout<T>> {
        let index: usize = rand::rng().random_range(0..self.exchangers.len());

        match self.exchangers.get(index) {
            Some(exchanger) => exchanger.exchange(item, self.wait_steps),
            None => Err(ExchangeTimeout(item)),
        }
    }
}

impl<T> StdFmt::Debug for EliminationArray<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("EliminationArray")
            .field("capacity", &self.capacity())
            .field("wait_steps", &self.wait_steps)
            .finish()
    }
}

// ============================================================================
//  BackoffEliminationStack
// ============================================================================

/// Treiber stack that backs off into an [`EliminationArray`] on contention.
///
/// ```rust
/// use syncds::config::EliminationConfig;
/// use syncds::{BackoffEliminationStack, ConcurrentStack};
///
/// let stack = BackoffEliminationStack::with_config(EliminationConfig::new(4, 200));
/// stack.push("x");
/// assert_eq!(stack.pop(), Ok("x"));
/// assert!(stack.is_empty());
/// ```
pub struct BackoffEliminationStack<T> {
    head: TreiberHead<T>,
    elimination: EliminationArray<T>,
    /// Pushes and pops completed through the array. Each push/pop pairing
    /// adds two.
    eliminated: AtomicUsize,
}

impl<T> BackoffEliminationStack<T> {
    /// Create an empty stack with the default [`EliminationConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EliminationConfig::default())
    }

    /// Create an empty stack with a custom elimination array.
    #[must_use]
    pub fn with_config(config: EliminationConfig) -> Self {
        debug_log!(
            capacity = config.capacity(),
            wait_steps = config.wait_steps(),
            "elimination stack created"
        );
        Self {
            head: TreiberHead::new(),
            elimination: EliminationArray::new(config),
            eliminated: AtomicUsize::new(0),
        }
    }

    /// Operations that completed through the elimination array instead of
    /// the head. Exact once all threads have quiesced.
    #[must_use]
    pub fn eliminated(&self) -> usize {
        self.eliminated.load(RELAXED)
    }
}

impl<T: Send + Sync> ConcurrentStack<T> for BackoffEliminationStack<T> {
    fn push(&self, value: T) {
        let mut node: Box<Node<T>> = Node::boxed(value);

        loop {
            node = match self.head.try_push_node(node) {
                Ok(()) => return,
                Err(back) => back,
            };

            match self.elimination.visit(Some(node.into_value())) {
                // A popper took it.
                Ok(None) => {
                    self.eliminated.fetch_add(1, RELAXED);
                    trace_log!("push eliminated");
                    return;
                }

                // Swapped with another pusher; push what we hold now.
                Ok(Some(swapped)) => node = Node::boxed(swapped),

                Err(ExchangeTimeout(Some(own))) => node = Node::boxed(own),

                Err(ExchangeTimeout(None)) => {
                    error_log!("exchanger timed out without returning the pushed value");
                    panic!("exchanger lost a pushed value on timeout");
                }
            }
        }
    }

    fn pop(&self) -> Result<T, StackError> {
        loop {
            match self.head.try_pop() {
                TryPop::Popped(value) => return Ok(value),
                TryPop::Empty => return Err(StackError::EmptyStack),
                TryPop::Contended => {}
            }

            // Only a pusher's value completes a pop; pop/pop pairs and
            // timeouts fall back to the CAS.
            if let Ok(Some(value)) = self.elimination.visit(None) {
                self.eliminated.fetch_add(1, RELAXED);
                trace_log!("pop eliminated");
                return Ok(value);
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

impl<T> Default for BackoffEliminationStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StdFmt::Debug for BackoffEliminationStack<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BackoffEliminationStack")
            .field("head", &self.head)
            .field("elimination", &self.elimination)
            .field("eliminated", &self.eliminated())
            .finish()
    }
}
