//! Logging macros that vanish without the `tracing` feature.
//!
//! Retry loops (optimistic validation, head CAS, exchanger polling) sit on the
//! hot path, so a default build must not even evaluate log arguments. With
//! `--features tracing` every macro forwards its tokens to the `tracing` macro
//! of the same level, structured fields included:
//!
//! ```ignore
//! trace_log!(attempts, "optimistic validation failed, restarting descent");
//! ```
//!
//! Call sites use the macros as statements only.

#![allow(unused_macros, unused_imports)]

/// Retries, exchanges and other per-attempt events.
macro_rules! trace_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::trace!($($arg)*);
        }
    };
}

/// Construction and growth events.
macro_rules! debug_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!($($arg)*);
        }
    };
}

/// Progress problems that are not faults, such as a descent that keeps
/// failing validation.
macro_rules! warn_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::warn!($($arg)*);
        }
    };
}

/// Protocol faults. Always followed by a `panic!`, so the fault reaches the
/// log even when a worker thread swallows the panic message.
macro_rules! error_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::error!($($arg)*);
        }
    };
}

pub(crate) use debug_log;
pub(crate) use error_log;
pub(crate) use trace_log;
pub(crate) use warn_log;
