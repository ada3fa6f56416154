//! Property-based invariants for the call queue.
//!
//! Random scripts of `add` and `perform_one` are checked against a simple
//! model after every operation:
//!
//! 1. Every registered call is in exactly one of `due` and `done`.
//! 2. `due` holds exactly the idempotent calls not yet performed, in
//!    registration order.
//! 3. `done` only grows, by appending.
//! 4. Each call is invoked at most once; mutating calls are never invoked
//!    by the queue.
//! 5. `perform_one` on an empty `due` is `Idle` and changes nothing.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use habiter_sync::{CallKind, CallQueue, DeferredAction, Performed, QueueError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add { kind: CallKind, fails: bool },
    Perform,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<bool>(), any::<bool>()).prop_map(|(idempotent, fails)| Op::Add {
            kind: if idempotent { CallKind::Idempotent } else { CallKind::Mutating },
            fails,
        }),
        2 => Just(Op::Perform),
    ]
}

fn ids(view: &habiter_model::SeqView<habiter_sync::QueuedCall<u32, String>>) -> Vec<u32> {
    view.with(|calls| {
        calls
            .iter()
            .map(|c| c.description().parse().unwrap_or(u32::MAX))
            .collect()
    })
}

proptest! {
    #[test]
    fn queue_matches_model(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut queue: CallQueue<u32, String> = CallQueue::new();
        let invoked = Rc::new(RefCell::new(Vec::new()));
        let mut model_due: Vec<u32> = Vec::new();
        let mut model_done: Vec<u32> = Vec::new();
        let mut mutating: HashSet<u32> = HashSet::new();
        let mut next = 0u32;

        for op in &ops {
            match op {
                Op::Add { kind, fails } => {
                    let id = next;
                    next += 1;
                    let log = Rc::clone(&invoked);
                    let fails = *fails;
                    let action = DeferredAction::new(id.to_string(), move || {
                        log.borrow_mut().push(id);
                        if fails { Err(format!("call {id} failed")) } else { Ok(id) }
                    });
                    queue.add(action, *kind).unwrap();
                    match kind {
                        CallKind::Idempotent => model_due.push(id),
                        CallKind::Mutating => {
                            model_done.push(id);
                            mutating.insert(id);
                        }
                    }
                }
                Op::Perform => {
                    let outcome = queue.perform_one();
                    if model_due.is_empty() {
                        prop_assert_eq!(outcome, Ok(Performed::Idle));
                    } else {
                        let id = model_due.remove(0);
                        model_done.push(id);
                        match outcome {
                            Ok(Performed::Completed(v)) => prop_assert_eq!(v, id),
                            Err(QueueError::Action(err)) => {
                                prop_assert!(err.step_error().is_some());
                            }
                            other => prop_assert!(false, "unexpected {:?}", other),
                        }
                    }
                }
            }

            prop_assert_eq!(ids(&queue.due()), model_due.clone());
            prop_assert_eq!(ids(&queue.done()), model_done.clone());

            let log = invoked.borrow();
            let unique: HashSet<u32> = log.iter().copied().collect();
            prop_assert_eq!(unique.len(), log.len());
            prop_assert!(log.iter().all(|id| !mutating.contains(id)));
        }
    }
}
