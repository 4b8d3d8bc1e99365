//! Loom tests for the exchanger handshake.
//!
//! Loom explores every interleaving of the two participants, including the
//! timeout race where the waiter withdraws while a partner CASes in.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib stack::loom_tests`
//!
//! NOTE: Loom tests use loom's own atomic types, so we create a simplified
//! version of the exchanger with the same states, tags and handover rules.

use loom::sync::Arc;
use loom::sync::atomic::{AtomicPtr, Ordering};
use loom::thread;
use std::ptr;

const EMPTY: usize = 0b00;
const WAITING: usize = 0b01;
const BUSY: usize = 0b10;
const TAG_MASK: usize = 0b11;

#[repr(align(8))]
struct Offer {
    item: Option<u32>,
}

fn tag(p: *mut Offer, t: usize) -> *mut Offer {
    p.map_addr(|a| a | t)
}

fn untag(p: *mut Offer) -> *mut Offer {
    p.map_addr(|a| a & !TAG_MASK)
}

fn tag_of(p: *mut Offer) -> usize {
    p.addr() & TAG_MASK
}

/// Take an owned offer.
fn take(p: *mut Offer) -> Option<u32> {
    // SAFETY: callers only take offers handed to them by a successful CAS.
    unsafe { Box::from_raw(untag(p)).item }
}

/// Simplified Exchanger for loom testing.
struct LoomExchanger {
    slot: AtomicPtr<Offer>,
}

impl LoomExchanger {
    fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// `Ok(partner item)` or `Err(own item)`.
    fn exchange(&self, item: Option<u32>, budget: usize) -> Result<Option<u32>, Option<u32>> {
        let mine = Box::into_raw(Box::new(Offer { item }));
        let mut steps = 0;

        while steps < budget {
            steps += 1;
            let current = self.slot.load(Ordering::Acquire);

            match tag_of(current) {
                EMPTY => {
                    if self
                        .slot
                        .compare_exchange(current, tag(mine, WAITING), Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return self.wait(mine, steps, budget);
                    }
                }
                WAITING => {
                    if self
                        .slot
                        .compare_exchange(current, tag(mine, BUSY), Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(take(current));
                    }
                }
                _ => {}
            }
            thread::yield_now();
        }

        Err(take(mine))
    }

    fn wait(&self, mine: *mut Offer, mut steps: usize, budget: usize) -> Result<Option<u32>, Option<u32>> {
        while steps < budget {
            steps += 1;
            let current = self.slot.load(Ordering::Acquire);
            if tag_of(current) == BUSY {
                let item = take(current);
                self.slot.store(ptr::null_mut(), Ordering::Release);
                return Ok(item);
            }
            thread::yield_now();
        }

        match self.slot.compare_exchange(
            tag(mine, WAITING),
            ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Err(take(mine)),
            Err(current) => {
                assert_eq!(tag_of(current), BUSY);
                let item = take(current);
                self.slot.store(ptr::null_mut(), Ordering::Release);
                Ok(item)
            }
        }
    }
}

/// Either both sides complete and items swap, or neither does.
#[test]
fn loom_exchange_is_all_or_nothing() {
    loom::model(|| {
        let exchanger = Arc::new(LoomExchanger::new());

        let e1 = Arc::clone(&exchanger);
        let t1 = thread::spawn(move || e1.exchange(Some(1), 2));

        let r2 = exchanger.exchange(Some(2), 2);
        let r1 = t1.join().unwrap();

        match (r1, r2) {
            (Ok(got1), Ok(got2)) => {
                assert_eq!(got1, Some(2));
                assert_eq!(got2, Some(1));
            }
            (Err(own1), Err(own2)) => {
                assert_eq!(own1, Some(1));
                assert_eq!(own2, Some(2));
            }
            (r1, r2) => panic!("half-completed exchange: {r1:?} / {r2:?}"),
        }

        assert!(exchanger.slot.load(Ordering::Acquire).is_null());
    });
}

/// A giver paired with a taker hands over exactly one value.
#[test]
fn loom_giver_taker_handover() {
    loom::model(|| {
        let exchanger = Arc::new(LoomExchanger::new());

        let e1 = Arc::clone(&exchanger);
        let taker = thread::spawn(move || e1.exchange(None, 2));

        let given = exchanger.exchange(Some(5), 2);
        let taken = taker.join().unwrap();

        match (given, taken) {
            (Ok(None), Ok(Some(5))) | (Err(Some(5)), Err(None)) => {}
            other => panic!("unexpected pairing {other:?}"),
        }
    });
}
