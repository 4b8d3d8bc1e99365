//! Single-slot rendezvous between two threads.
//!
//! # Slot States
//!
//! The slot is one `AtomicPtr<Offer<T>>`; the state lives in the two low tag
//! bits of the pointer:
//!
//! ```text
//! EMPTY    null
//! WAITING  offer of the waiting thread | 0b01
//! BUSY     offer of the partner        | 0b10
//! ```
//!
//! # Ownership
//!
//! An offer belongs to whoever put it in the slot until a CAS hands it over:
//!
//! - The partner that CASes `WAITING(p)` to `BUSY(q)` takes `p`.
//! - The waiter that observes `BUSY(q)` takes `q` and stores `EMPTY`.
//! - A waiter that times out CASes `WAITING(p)` back to `EMPTY` and keeps `p`.
//!   If that CAS fails, a partner already took `p` and left `BUSY(q)`, so the
//!   exchange completes after all.
//!
//! Only the waiter moves the slot out of `WAITING` or `BUSY` except for the
//! single partner CAS, so an offer is never touched by two threads at once
//! and no reclamation scheme is needed. Address reuse of a freed offer is
//! harmless: a CAS against a recycled `WAITING` pointer pairs with whoever
//! is waiting now.

use std::fmt as StdFmt;
use std::hint as StdHint;
use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, WRITE_ORD};
use crate::tagged::{ptr_tag, tag_ptr, untag_ptr};
use crate::tracing_helpers::{error_log, trace_log};

const EMPTY: usize = 0b00;
const WAITING: usize = 0b01;
const BUSY: usize = 0b10;

/// Payload parked in the slot. Aligned so the tag bits are free.
#[repr(C, align(8))]
struct Offer<T> {
    item: Option<T>,
}

impl<T> Offer<T> {
    fn boxed(item: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self { item }))
    }

    /// # Safety
    ///
    /// `ptr` (untagged) must come from [`Offer::boxed`] and be owned by the
    /// caller per the handover rules above.
    unsafe fn take(ptr: *mut Self) -> Option<T> {
        // SAFETY: forwarded from the caller.
        unsafe { Box::from_raw(untag_ptr(ptr)).item }
    }
}

/// Returned by [`Exchanger::exchange`] when no partner arrived in time.
/// Carries the caller's own offer back.
#[derive(Debug, PartialEq, Eq)]
pub struct ExchangeTimeout<T>(pub Option<T>);

/// Lock-free single-slot exchanger.
///
/// Two threads calling [`exchange`](Self::exchange) close enough in time
/// swap their items. `None` stands for "nothing to give", which is how a
/// popper asks for a pusher's value.
pub struct Exchanger<T> {
    slot: AtomicPtr<Offer<T>>,
    _marker: PhantomData<T>,
}

// SAFETY: items are moved between threads, never shared.
unsafe impl<T: Send> Send for Exchanger<T> {}
// SAFETY: see above; `&Exchanger` only ever moves owned items.
unsafe impl<T: Send> Sync for Exchanger<T> {}

impl<T> Exchanger<T> {
    /// Create an exchanger with an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: AtomicPtr::new(StdPtr::null_mut()),
            _marker: PhantomData,
        }
    }

    /// Offer `item` and wait up to `wait_steps` polling steps for a partner.
    ///
    /// # Errors
    ///
    /// [`ExchangeTimeout`] with the caller's own item when the budget ran out
    /// before a partner showed up.
    pub fn exchange(&self, item: Option<T>, wait_steps: usize) -> Result<Option<T>, ExchangeTimeout<T>> {
        let mine: *mut Offer<T> = Offer::boxed(item);
        let mut steps: usize = 0;

        while steps < wait_steps {
            steps += 1;
            let current: *mut Offer<T> = self.slot.load(READ_ORD);

            match ptr_tag(current) {
                EMPTY => {
                    let waiting: *mut Offer<T> = tag_ptr(mine, WAITING);
                    if self
                        .slot
                        .compare_exchange(current, waiting, CAS_SUCCESS, CAS_FAILURE)
                        .is_ok()
                    {
                        return self.await_partner(mine, steps, wait_steps);
                    }
                }

                WAITING => {
                    let busy: *mut Offer<T> = tag_ptr(mine, BUSY);
                    if self
                        .slot
                        .compare_exchange(current, busy, CAS_SUCCESS, CAS_FAILURE)
                        .is_ok()
                    {
                        trace_log!("exchange completed as partner");
                        // SAFETY: the successful CAS handed the waiter's offer to us.
                        return Ok(unsafe { Offer::take(current) });
                    }
                }

                // Another pair is mid-exchange.
                _ => {}
            }

            StdHint::spin_loop();
        }

        // SAFETY: `mine` was never published, or every publication was undone.
        Err(ExchangeTimeout(unsafe { Offer::take(mine) }))
    }

    /// Waiter side: `mine` is parked in the slot as `waiting`.
    fn await_partner(
        &self,
        mine: *mut Offer<T>,
        mut steps: usize,
        wait_steps: usize,
    ) -> Result<Option<T>, ExchangeTimeout<T>> {
        let waiting: *mut Offer<T> = tag_ptr(mine, WAITING);

        while steps < wait_steps {
            steps += 1;
            let current: *mut Offer<T> = self.slot.load(READ_ORD);

            if ptr_tag(current) == BUSY {
                return Ok(self.finish_as_waiter(current));
            }

            StdHint::spin_loop();
        }

        match self
            .slot
            .compare_exchange(waiting, StdPtr::null_mut(), CAS_SUCCESS, CAS_FAILURE)
        {
            Ok(_) => {
                trace_log!(steps, "exchange timed out");
                // SAFETY: the withdrawal CAS succeeded, nobody took `mine`.
                Err(ExchangeTimeout(unsafe { Offer::take(mine) }))
            }

            Err(current) => {
                if ptr_tag(current) != BUSY {
                    error_log!(tag = ptr_tag(current), "waiting slot left by a non-partner");
                    panic!("exchanger slot moved out of WAITING without a partner");
                }
                Ok(self.finish_as_waiter(current))
            }
        }
    }

    /// Take the partner's offer out of a `BUSY` slot and reopen it.
    fn finish_as_waiter(&self, busy: *mut Offer<T>) -> Option<T> {
        // SAFETY: only the waiter leaves BUSY, and the partner handed its
        // offer over with the CAS that set it.
        let item: Option<T> = unsafe { Offer::take(busy) };
        self.slot.store(StdPtr::null_mut(), WRITE_ORD);
        trace_log!("exchange completed as waiter");
        item
    }
}

impl<T> Default for Exchanger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StdFmt::Debug for Exchanger<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let state: &str = match ptr_tag(self.slot.load(READ_ORD)) {
            EMPTY => "empty",
            WAITING => "waiting",
            _ => "busy",
        };
        f.debug_struct("Exchanger").field("state", &state).finish()
    }
}

impl<T> Drop for Exchanger<T> {
    fn drop(&mut self) {
        let current: *mut Offer<T> = *self.slot.get_mut();
        if !current.is_null() {
            // SAFETY: exclusive access; a parked offer has no other owner left.
            drop(unsafe { Offer::take(current) });
        }
    }
}
