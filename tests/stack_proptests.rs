//! Property-based tests for the `stack` module.
//!
//! Single-threaded differential testing against `Vec` as an oracle for both
//! stack variants, plus the elimination array's building blocks.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use proptest::prelude::*;
use syncds::stack::{ExchangeTimeout, Exchanger, TreiberHead, TryPop};
use syncds::{BackoffEliminationStack, ConcurrentStack, EliminationConfig, LockFreeStack, StackError};

// ============================================================================
//  Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Pop,
    Peek,
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => any::<i32>().prop_map(Op::Push),
            2 => Just(Op::Pop),
            1 => Just(Op::Peek),
        ],
        0..=max_ops,
    )
}

// ============================================================================
//  Differential Oracle
// ============================================================================

fn check_against_vec<S: ConcurrentStack<i32>>(stack: &S, ops: &[Op]) -> Result<(), TestCaseError> {
    let mut oracle: Vec<i32> = Vec::new();

    for op in ops {
        match op {
            Op::Push(v) => {
                stack.push(*v);
                oracle.push(*v);
            }
            Op::Pop => {
                prop_assert_eq!(stack.pop().ok(), oracle.pop());
            }
            Op::Peek => {
                prop_assert_eq!(stack.peek(), oracle.last().copied().unwrap_or_default());
            }
        }
        prop_assert_eq!(stack.len(), oracle.len());
        prop_assert_eq!(stack.is_empty(), oracle.is_empty());
    }

    while let Some(expected) = oracle.pop() {
        prop_assert_eq!(stack.pop(), Ok(expected));
    }
    prop_assert_eq!(stack.pop(), Err(StackError::EmptyStack));
    Ok(())
}

proptest! {
    #[test]
    fn lock_free_matches_vec(ops in operations(300)) {
        check_against_vec(&LockFreeStack::new(), &ops)?;
    }

    #[test]
    fn elimination_matches_vec(ops in operations(300)) {
        check_against_vec(&BackoffEliminationStack::new(), &ops)?;
    }

    #[test]
    fn elimination_config_does_not_change_semantics(
        ops in operations(100),
        capacity in 1usize..16,
        wait_steps in 1usize..64,
    ) {
        let config = EliminationConfig::new(capacity, wait_steps);
        check_against_vec(&BackoffEliminationStack::with_config(config), &ops)?;
    }

    /// Pushing a sequence and draining it yields the sequence reversed.
    #[test]
    fn drain_reverses_pushes(values in prop::collection::vec(any::<u64>(), 0..200)) {
        let stack = LockFreeStack::new();
        for &v in &values {
            stack.push(v);
        }
        let drained: Vec<u64> = std::iter::from_fn(|| stack.pop().ok()).collect();
        let expected: Vec<u64> = values.iter().rev().copied().collect();
        prop_assert_eq!(drained, expected);
    }
}

// ============================================================================
//  Fixed Scenarios
// ============================================================================

#[test]
fn lifo_order_for_both_variants() {
    let stacks: [Box<dyn ConcurrentStack<i32>>; 2] =
        [Box::new(LockFreeStack::new()), Box::new(BackoffEliminationStack::new())];

    for stack in &stacks {
        stack.push(5);
        stack.push(20);
        stack.push(10);

        assert_eq!(stack.len(), 3);
        assert_eq!(stack.peek(), 10);
        assert_eq!(stack.pop().unwrap(), 10);
        assert_eq!(stack.pop().unwrap(), 20);
        assert_eq!(stack.pop().unwrap(), 5);
        assert_eq!(stack.pop(), Err(StackError::EmptyStack));
        assert_eq!(stack.peek(), 0);
        assert!(stack.is_empty());
    }
}

#[test]
fn owned_values_survive_the_round_trip() {
    let stack: BackoffEliminationStack<String> = BackoffEliminationStack::new();
    for word in ["alpha", "beta", "gamma"] {
        stack.push(word.to_owned());
    }
    assert_eq!(stack.pop().unwrap(), "gamma");
    assert_eq!(stack.len(), 2);
    drop(stack);
}

#[test]
fn error_message_is_human_readable() {
    assert_eq!(StackError::EmptyStack.to_string(), "stack is empty");
}

#[test]
fn treiber_head_single_attempts_succeed_uncontended() {
    let head: TreiberHead<u8> = TreiberHead::new();
    assert!(matches!(head.try_pop(), TryPop::Empty));

    head.try_push(1).unwrap();
    head.try_push(2).unwrap();
    assert_eq!(head.peek(), Some(2));
    assert_eq!(head.len(), 2);

    assert!(matches!(head.try_pop(), TryPop::Popped(2)));
    assert!(matches!(head.try_pop(), TryPop::Popped(1)));
    assert!(head.is_empty());
}

#[test]
fn lone_exchanger_returns_own_item() {
    let exchanger: Exchanger<u16> = Exchanger::new();
    assert_eq!(exchanger.exchange(Some(9), 16), Err(ExchangeTimeout(Some(9))));
    assert_eq!(exchanger.exchange(None, 16), Err(ExchangeTimeout(None)));
}
