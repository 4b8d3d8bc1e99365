//! Shared helpers for the integration tests.
//!
//! `init_tracing` installs one subscriber per test binary: a compact console
//! layer plus an NDJSON file layer at `logs/syncds.jsonl`, both filtered by
//! `RUST_LOG` (default `info`). Library events only appear when the crate is
//! built with `--features tracing`.
//!
//! - `SYNCDS_LOG_DIR` moves the log file.
//! - `SYNCDS_LOG_CONSOLE=0` silences the console layer.

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Barrier, Once};
use std::thread;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the test subscriber. Only the first call per process does anything.
#[expect(clippy::expect_used)]
pub fn init_tracing() {
    INIT.call_once(|| {
        let dir = env::var("SYNCDS_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from);
        std::fs::create_dir_all(&dir).expect("create log directory");

        // Append: nextest runs every test in its own process.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("syncds.jsonl"))
            .expect("open log file");

        let console_off = env::var("SYNCDS_LOG_CONSOLE").is_ok_and(|v| v == "0");
        let console = (!console_off).then(|| {
            tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .compact()
                .with_filter(env_filter())
        });

        let json = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_thread_ids(true)
            .with_target(true)
            .json()
            .with_filter(env_filter());

        // A subscriber installed elsewhere in the process wins.
        let _ = Registry::default().with(console).with(json).try_init();
    });
}

// ============================================================================
//  Thread helpers
// ============================================================================

/// Run `body(thread_index)` on `threads` threads released together by a
/// barrier, and collect the results in thread order.
#[expect(clippy::expect_used)]
pub fn run_threads<R, F>(threads: usize, body: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(usize) -> R + Send + Sync + 'static,
{
    let body = Arc::new(body);
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let body = Arc::clone(&body);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                body(t)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().expect("worker thread panicked"))
        .collect()
}

/// Cheap deterministic per-thread pseudo-random sequence.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x517c_c1b7_2722_0a95) | 1)
    }

    pub fn next_below(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        (self.0 >> 16) % bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_threads_preserves_order() {
        let results = run_threads(4, |t| t * 10);
        assert_eq!(results, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!(helper = "common", "subscriber installed once");
    }

    #[test]
    fn test_lcg_stays_below_bound() {
        let mut rng = Lcg::new(3);
        assert!((0..1_000).all(|_| rng.next_below(7) < 7));
    }
}
