//! Contention driver for every tree and stack variant.
//!
//! Runs a sequential warm-up and a concurrent mixed workload per variant,
//! prints timings, and reports threads that stop making progress.
//!
//! Run with:
//! ```bash
//! RUST_LOG=syncds=debug cargo run --release --features tracing -- 8 50000
//! ```
//! Arguments: `[threads] [ops_per_thread] [key_space]`.

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use syncds::{
    BackoffEliminationStack, CoarseLockTree, ConcurrentMap, ConcurrentStack, FineGrainedLockTree,
    LockFreeStack, OptimisticLockTree,
};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// A thread silent for this long is reported as stuck.
const STALL_MS: u64 = 2000;

// =============================================================================
// Thread progress tracking for hang detection
// =============================================================================

struct ThreadProgress {
    /// Current operation index for each thread
    current_op: Vec<AtomicUsize>,
    /// Current key (or value) being processed by each thread
    current_key: Vec<AtomicU64>,
    /// Last time each thread made progress
    last_progress_ms: Vec<AtomicU64>,
    /// Whether each thread is done
    done: Vec<AtomicBool>,
    start: Instant,
}

impl ThreadProgress {
    fn new(num_threads: usize) -> Self {
        Self {
            current_op: (0..num_threads).map(|_| AtomicUsize::new(0)).collect(),
            current_key: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
            last_progress_ms: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
            done: (0..num_threads).map(|_| AtomicBool::new(false)).collect(),
            start: Instant::now(),
        }
    }

    fn update(&self, thread_id: usize, op: usize, key: u64) {
        self.current_op[thread_id].store(op, Ordering::Relaxed);
        self.current_key[thread_id].store(key, Ordering::Relaxed);
        self.last_progress_ms[thread_id]
            .store(self.start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn mark_done(&self, thread_id: usize) {
        self.done[thread_id].store(true, Ordering::Relaxed);
    }

    fn report_stuck(&self, timeout_ms: u64) -> Vec<(usize, usize, u64, u64)> {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let mut stuck = Vec::new();

        for i in 0..self.done.len() {
            if self.done[i].load(Ordering::Relaxed) {
                continue;
            }
            let last = self.last_progress_ms[i].load(Ordering::Relaxed);
            if now_ms.saturating_sub(last) > timeout_ms {
                stuck.push((
                    i,
                    self.current_op[i].load(Ordering::Relaxed),
                    self.current_key[i].load(Ordering::Relaxed),
                    now_ms - last,
                ));
            }
        }
        stuck
    }

    fn all_done(&self) -> bool {
        self.done.iter().all(|d| d.load(Ordering::Relaxed))
    }
}

/// Watch `progress` until every thread is done or `stop` is raised.
fn spawn_watchdog(
    label: &'static str,
    progress: Arc<ThreadProgress>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut reports = 0;
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(500));
            for (tid, op, key, stall_ms) in &progress.report_stuck(STALL_MS) {
                tracing::warn!(label, tid, op, key, stall_ms, "thread made no progress");
                eprintln!("!!! STUCK [{label}]: thread {tid} at op {op} key={key} for {stall_ms}ms");
                reports += 1;
            }
            if progress.all_done() {
                break;
            }
        }
        reports
    })
}

// =============================================================================
// Workloads
// =============================================================================

/// Linear congruential step (same constants as the benches).
const fn next_state(state: u64) -> u64 {
    state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1)
}

fn run_map<M>(label: &'static str, threads: usize, ops_per_thread: usize, key_space: u64)
where
    M: ConcurrentMap<u64, u64> + Default + 'static,
{
    println!("\n{}", "=".repeat(80));
    println!("{label}: {threads} threads, {ops_per_thread} ops/thread, {key_space} keys");
    println!("{}", "=".repeat(80));

    // Sequential phase: scrambled keys, checked after every removal.
    let map = Arc::new(M::default());
    let warmup = Instant::now();
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    for _ in 0..key_space {
        state = next_state(state);
        map.insert(state % key_space, state);
    }
    for key in (0..key_space).step_by(3) {
        map.remove(&key);
    }
    assert!(map.is_valid(), "{label}: invalid after sequential phase");
    println!("{label} sequential: {:?}", warmup.elapsed());

    let progress = Arc::new(ThreadProgress::new(threads));
    let stop = Arc::new(AtomicBool::new(false));
    let watchdog = spawn_watchdog(label, Arc::clone(&progress), Arc::clone(&stop));

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let map = Arc::clone(&map);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                let mut state = (t as u64 + 1).wrapping_mul(0x517c_c1b7_2722_0a95);
                for op in 0..ops_per_thread {
                    state = next_state(state);
                    let key = (state >> 16) % key_space;
                    progress.update(t, op, key);

                    let op_start = Instant::now();
                    match state % 10 {
                        0..=4 => {
                            let _ = map.find(&key);
                        }
                        5..=7 => map.insert(key, key * 1000 + t as u64),
                        _ => map.remove(&key),
                    }

                    let op_elapsed = op_start.elapsed();
                    if op_elapsed > Duration::from_millis(100) {
                        eprintln!("[{label} T{t:02}] SLOW op {op} key={key} took {op_elapsed:?}");
                    }
                }
                progress.mark_done(t);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    let elapsed = start.elapsed();
    stop.store(true, Ordering::Relaxed);
    let stuck_reports = watchdog.join().unwrap();

    let total = threads * ops_per_thread;
    println!(
        "{label} concurrent: {total} ops in {elapsed:?} ({:.0} ops/sec), valid={}, stalls={stuck_reports}",
        total as f64 / elapsed.as_secs_f64(),
        map.is_valid(),
    );
}

fn run_stack<S>(label: &'static str, threads: usize, ops_per_thread: usize)
where
    S: ConcurrentStack<u64> + Default + 'static,
{
    println!("\n{}", "=".repeat(80));
    println!("{label}: {threads} threads, {ops_per_thread} push+pop/thread");
    println!("{}", "=".repeat(80));

    let stack = Arc::new(S::default());
    let progress = Arc::new(ThreadProgress::new(threads));
    let stop = Arc::new(AtomicBool::new(false));
    let watchdog = spawn_watchdog(label, Arc::clone(&progress), Arc::clone(&stop));

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let stack = Arc::clone(&stack);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                let mut pushed: u64 = 0;
                let mut popped: u64 = 0;
                for op in 0..ops_per_thread {
                    let value = (t * ops_per_thread + op) as u64;
                    progress.update(t, op, value);
                    stack.push(value);
                    pushed += value;

                    // Pop every other round so the stack alternates between
                    // growing and draining under contention.
                    if op % 2 == 1 {
                        for _ in 0..2 {
                            if let Ok(v) = stack.pop() {
                                popped += v;
                            }
                        }
                    }
                }
                progress.mark_done(t);
                (pushed, popped)
            })
        })
        .collect();

    let mut pushed_sum: u64 = 0;
    let mut popped_sum: u64 = 0;
    for h in handles {
        let (pushed, popped) = h.join().unwrap();
        pushed_sum += pushed;
        popped_sum += popped;
    }
    let elapsed = start.elapsed();
    stop.store(true, Ordering::Relaxed);
    let stuck_reports = watchdog.join().unwrap();

    while let Ok(v) = stack.pop() {
        popped_sum += v;
    }

    let total = threads * ops_per_thread;
    println!(
        "{label}: {total} pushes in {elapsed:?} ({:.0} ops/sec), conserved={}, stalls={stuck_reports}",
        total as f64 / elapsed.as_secs_f64(),
        pushed_sum == popped_sum,
    );
}

// =============================================================================
// Main
// =============================================================================

fn arg_or(index: usize, default: usize) -> usize {
    std::env::args()
        .nth(index)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .compact()
        .init();

    let threads = arg_or(1, 8);
    let ops_per_thread = arg_or(2, 50_000);
    let key_space = arg_or(3, 10_000) as u64;

    eprintln!("syncds contention driver");
    eprintln!("========================");
    eprintln!("Watchdog reports any thread stuck for >{STALL_MS}ms.");

    run_map::<CoarseLockTree<u64, u64>>("coarse", threads, ops_per_thread, key_space);
    run_map::<FineGrainedLockTree<u64, u64>>("fine-grained", threads, ops_per_thread, key_space);
    run_map::<OptimisticLockTree<u64, u64>>("optimistic", threads, ops_per_thread, key_space);

    run_stack::<LockFreeStack<u64>>("treiber", threads, ops_per_thread);
    run_stack::<BackoffEliminationStack<u64>>("elimination", threads, ops_per_thread);

    eprintln!("\nAll runs completed!");
}
