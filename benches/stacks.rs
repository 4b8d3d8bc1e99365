//! Benchmarks: stack variants against a mutex-guarded `Vec`.
//!
//! The elimination stack only pays off once the head is contended, so every
//! group scales the thread count.
//!
//! ```bash
//! cargo bench --bench stacks
//! cargo bench --bench stacks --features mimalloc
//! ```

#![expect(clippy::unwrap_used)]
#![expect(clippy::pedantic)]

use divan::{Bencher, black_box};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use syncds::{BackoffEliminationStack, ConcurrentStack, EliminationConfig, LockFreeStack, StackError};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    divan::main();
}

const OPS_PER_THREAD: usize = 10_000;

// =============================================================================
// Baseline
// =============================================================================

#[derive(Default)]
struct MutexVec(Mutex<Vec<u64>>);

impl ConcurrentStack<u64> for MutexVec {
    fn push(&self, value: u64) {
        self.0.lock().push(value);
    }

    fn pop(&self) -> Result<u64, StackError> {
        self.0.lock().pop().ok_or(StackError::EmptyStack)
    }

    fn peek(&self) -> u64 {
        self.0.lock().last().copied().unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

// =============================================================================
// Workloads
// =============================================================================

/// Every thread alternates push and pop.
fn push_pop_pairs<S>(bencher: Bencher, stack: S, threads: usize)
where
    S: ConcurrentStack<u64> + 'static,
{
    let stack = Arc::new(stack);

    bencher.bench_local(|| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    let mut sum = 0u64;
                    for i in 0..OPS_PER_THREAD {
                        stack.push((t * OPS_PER_THREAD + i) as u64);
                        if let Ok(v) = stack.pop() {
                            sum += v;
                        }
                    }
                    black_box(sum);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    });
}

/// Half the threads only push, half only pop.
fn producers_consumers<S>(bencher: Bencher, stack: S, threads: usize)
where
    S: ConcurrentStack<u64> + 'static,
{
    let stack = Arc::new(stack);

    bencher.bench_local(|| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    if t % 2 == 0 {
                        for i in 0..OPS_PER_THREAD {
                            stack.push(i as u64);
                        }
                    } else {
                        for _ in 0..OPS_PER_THREAD {
                            black_box(stack.pop().ok());
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        // Leave the stack empty for the next sample.
        while stack.pop().is_ok() {}
    });
}

// =============================================================================
// 01: PUSH/POP PAIRS
// =============================================================================

#[divan::bench_group(name = "01_push_pop_pairs")]
mod pairs {
    use super::{
        BackoffEliminationStack, Bencher, EliminationConfig, LockFreeStack, MutexVec,
        push_pop_pairs,
    };

    #[divan::bench(args = [1, 2, 4, 8, 16])]
    fn lock_free(bencher: Bencher, threads: usize) {
        push_pop_pairs(bencher, LockFreeStack::new(), threads);
    }

    #[divan::bench(args = [1, 2, 4, 8, 16])]
    fn elimination(bencher: Bencher, threads: usize) {
        push_pop_pairs(bencher, BackoffEliminationStack::new(), threads);
    }

    #[divan::bench(args = [1, 2, 4, 8, 16])]
    fn elimination_wide(bencher: Bencher, threads: usize) {
        let config = EliminationConfig::default().with_capacity(32).with_wait_steps(100);
        push_pop_pairs(bencher, BackoffEliminationStack::with_config(config), threads);
    }

    #[divan::bench(args = [1, 2, 4, 8, 16])]
    fn mutex_vec(bencher: Bencher, threads: usize) {
        push_pop_pairs(bencher, MutexVec::default(), threads);
    }
}

// =============================================================================
// 02: PRODUCERS / CONSUMERS
// =============================================================================

#[divan::bench_group(name = "02_producers_consumers")]
mod producers {
    use super::{BackoffEliminationStack, Bencher, LockFreeStack, MutexVec, producers_consumers};

    #[divan::bench(args = [2, 4, 8, 16])]
    fn lock_free(bencher: Bencher, threads: usize) {
        producers_consumers(bencher, LockFreeStack::new(), threads);
    }

    #[divan::bench(args = [2, 4, 8, 16])]
    fn elimination(bencher: Bencher, threads: usize) {
        producers_consumers(bencher, BackoffEliminationStack::new(), threads);
    }

    #[divan::bench(args = [2, 4, 8, 16])]
    fn mutex_vec(bencher: Bencher, threads: usize) {
        producers_consumers(bencher, MutexVec::default(), threads);
    }
}
