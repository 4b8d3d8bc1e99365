//! Property-based tests for the `nodeversion` module.
//!
//! These tests verify invariants and properties that should hold for all inputs.

use syncds::nodeversion::{MAX_GENERATION, NodeVersion};
use proptest::prelude::*;

// ============================================================================
//  Bit Constants (mirrored for testing)
// ============================================================================

const GEN_SHIFT: u32 = 2;

// ============================================================================
//  Strategies
// ============================================================================

/// Strategy for generating unlocked version values at any generation.
fn clean_version() -> impl Strategy<Value = u32> {
    (0..=MAX_GENERATION).prop_map(|generation| generation << GEN_SHIFT)
}

/// One locked critical section: `true` if it unlinks the node.
fn critical_sections(max: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..=max)
}

// ============================================================================
//  Generation Properties
// ============================================================================

proptest! {
    /// The generation moves exactly once per unlinking critical section.
    #[test]
    fn generation_counts_unlinks(start in clean_version(), sections in critical_sections(64)) {
        let v = NodeVersion::from_value(start);
        let initial: u32 = v.generation();

        for &unlinks in &sections {
            let mut guard = v.lock();
            prop_assert_eq!(guard.generation(), v.generation());
            if unlinks {
                guard.mark_unlinked();
            }
        }

        let unlinks = sections.iter().filter(|&&u| u).count() as u32;
        let expected = initial.wrapping_add(unlinks) & MAX_GENERATION;
        prop_assert_eq!(v.generation(), expected);
        prop_assert!(!v.is_locked());
        prop_assert!(!v.is_unlinked());
    }

    /// A plain lock/unlock pair restores the exact raw value.
    #[test]
    fn plain_unlock_restores_value(start in clean_version()) {
        let v = NodeVersion::from_value(start);
        drop(v.lock());
        prop_assert_eq!(v.value(), start);
    }

    /// `try_lock` fails while locked and succeeds after release, at any generation.
    #[test]
    fn try_lock_respects_holder(start in clean_version()) {
        let v = NodeVersion::from_value(start);
        let guard = v.try_lock();
        prop_assert!(guard.is_some());
        prop_assert!(v.try_lock().is_none());
        drop(guard);
        prop_assert!(v.try_lock().is_some());
    }
}
