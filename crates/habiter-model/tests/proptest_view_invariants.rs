//! Property-based invariant tests for observable sequences and their views.
//!
//! Random operation scripts are applied both to a plain `Vec` and to an
//! `ObservableSeq` with a mapped and a filtered view attached. After every
//! single operation:
//!
//! 1. The sequence equals the reference `Vec`.
//! 2. The mapped view equals `reference.map(f)`.
//! 3. The filtered view equals `reference.filter(p)`.
//! 4. The filtered view's source indices are strictly increasing and point
//!    at the shown elements.
//! 5. Replaying the recorded change log onto a copy of the initial content
//!    reproduces the sequence (events are complete and ordered).
//! 6. A filtered view built over a mapped view equals
//!    `reference.map(f).filter(p)`.
//! 7. Rejected operations leave every collection untouched.

use std::cell::RefCell;
use std::rc::Rc;

use habiter_model::{
    FilteringProxy, MappingProxy, ObservableSeq, OwnedChange, SeqError, SliceRange,
};
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Insert(usize, i32),
    Set(usize, i32),
    Remove(usize),
    Reset(Vec<i32>),
    Assign {
        start: usize,
        stop: usize,
        step: usize,
        values: Vec<i32>,
    },
    Delete {
        start: usize,
        stop: usize,
        step: usize,
    },
}

fn value() -> impl Strategy<Value = i32> {
    -20i32..20
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..24, value()).prop_map(|(i, v)| Op::Insert(i, v)),
        4 => (0usize..24, value()).prop_map(|(i, v)| Op::Set(i, v)),
        3 => (0usize..24).prop_map(Op::Remove),
        1 => proptest::collection::vec(value(), 0..12).prop_map(Op::Reset),
        2 => (0usize..16, 0usize..16, 1usize..4, proptest::collection::vec(value(), 0..8))
            .prop_map(|(start, stop, step, values)| Op::Assign { start, stop, step, values }),
        1 => (0usize..16, 0usize..16, 1usize..4)
            .prop_map(|(start, stop, step)| Op::Delete { start, stop, step }),
    ]
}

fn initial_strategy() -> impl Strategy<Value = Vec<i32>> {
    proptest::collection::vec(value(), 0..12)
}

// ── Reference model ───────────────────────────────────────────────────────

fn mapped(x: &i32) -> i64 {
    i64::from(*x) * 3 + 1
}

fn keep(x: &i32) -> bool {
    x.rem_euclid(3) != 0
}

fn keep_mapped(x: &i64) -> bool {
    x % 2 == 0
}

/// Apply `op` to the reference vector with the same semantics as the
/// observable sequence. Returns false when the sequence must reject it.
fn apply_reference(reference: &mut Vec<i32>, op: &Op) -> bool {
    match op {
        Op::Insert(i, v) => {
            if *i > reference.len() {
                return false;
            }
            reference.insert(*i, *v);
        }
        Op::Set(i, v) => {
            if *i >= reference.len() {
                return false;
            }
            reference[*i] = *v;
        }
        Op::Remove(i) => {
            if *i >= reference.len() {
                return false;
            }
            reference.remove(*i);
        }
        Op::Reset(values) => *reference = values.clone(),
        Op::Assign {
            start,
            stop,
            step,
            values,
        } => {
            let len = reference.len();
            let start = (*start).min(len);
            let stop = (*stop).min(len).max(start);
            let indices: Vec<usize> = (start..stop).step_by(*step).collect();
            if *step != 1 {
                if indices.len() != values.len() {
                    return false;
                }
                for (i, v) in indices.into_iter().zip(values) {
                    reference[i] = *v;
                }
            } else {
                reference.splice(start..stop, values.iter().copied());
            }
        }
        Op::Delete { start, stop, step } => {
            let len = reference.len();
            let start = (*start).min(len);
            let stop = (*stop).min(len).max(start);
            let indices: Vec<usize> = (start..stop).step_by(*step).collect();
            for i in indices.into_iter().rev() {
                reference.remove(i);
            }
        }
    }
    true
}

fn apply_observable(seq: &ObservableSeq<i32>, op: &Op) -> Result<(), SeqError> {
    match op {
        Op::Insert(i, v) => seq.insert(*i, *v),
        Op::Set(i, v) => seq.set(*i, *v),
        Op::Remove(i) => seq.remove(*i).map(drop),
        Op::Reset(values) => seq.reset(values.clone()),
        Op::Assign {
            start,
            stop,
            step,
            values,
        } => seq.splice_assign(
            SliceRange::new(*start, *stop).with_step(*step),
            values.clone(),
        ),
        Op::Delete { start, stop, step } => seq
            .delete_range(SliceRange::new(*start, *stop).with_step(*step))
            .map(drop),
    }
}

fn replay(contents: &mut Vec<i32>, change: &OwnedChange<i32>) {
    match change {
        OwnedChange::Insert(i, v) => contents.insert(*i, *v),
        OwnedChange::Update(i, v) => contents[*i] = *v,
        OwnedChange::Remove(i) => {
            contents.remove(*i);
        }
        OwnedChange::Reset(values) => *contents = values.clone(),
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Tests
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn views_track_reference_after_every_op(
        initial in initial_strategy(),
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        let seq = ObservableSeq::from_vec(initial.clone());
        let map_view = MappingProxy::new(&seq, mapped);
        let filter_view = FilteringProxy::new(&seq, keep);
        let chained = FilteringProxy::new(&map_view, keep_mapped);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let _sub = seq.subscribe(move |change| sink.borrow_mut().push(change.to_owned()));

        let mut reference = initial.clone();
        for op in &ops {
            let before = reference.clone();
            let accepted = apply_reference(&mut reference, op);
            let outcome = apply_observable(&seq, op);
            prop_assert_eq!(accepted, outcome.is_ok(), "op {:?} -> {:?}", op, outcome);
            if !accepted {
                prop_assert!(outcome.unwrap_err().is_validation());
                prop_assert_eq!(&reference, &before);
            }

            prop_assert_eq!(seq.to_vec(), reference.clone());

            let expected_map: Vec<i64> = reference.iter().map(mapped).collect();
            prop_assert_eq!(map_view.to_vec(), expected_map.clone());

            let expected_filter: Vec<i32> = reference.iter().copied().filter(keep).collect();
            prop_assert_eq!(filter_view.to_vec(), expected_filter);

            let indices = filter_view.source_indices();
            prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(indices.len(), filter_view.len());
            for (k, &i) in indices.iter().enumerate() {
                prop_assert_eq!(filter_view.get(k), seq.get(i));
            }

            let expected_chain: Vec<i64> =
                expected_map.iter().copied().filter(keep_mapped).collect();
            prop_assert_eq!(chained.to_vec(), expected_chain);
        }

        let mut replayed = initial;
        for change in log.borrow().iter() {
            replay(&mut replayed, change);
        }
        prop_assert_eq!(replayed, reference);
    }

    #[test]
    fn set_filter_matches_fresh_filter(
        initial in initial_strategy(),
        ops in proptest::collection::vec(op_strategy(), 0..20),
        modulus in 2i32..5,
    ) {
        let seq = ObservableSeq::from_vec(initial);
        let proxy = FilteringProxy::new(&seq, keep);
        for op in &ops {
            let _ = apply_observable(&seq, op);
        }
        proxy.set_filter(move |x| x.rem_euclid(modulus) == 0).unwrap();
        let fresh = FilteringProxy::new(&seq, move |x: &i32| x.rem_euclid(modulus) == 0);
        prop_assert_eq!(proxy.to_vec(), fresh.to_vec());
        prop_assert_eq!(proxy.source_indices(), fresh.source_indices());

        for op in &ops {
            let _ = apply_observable(&seq, op);
            prop_assert_eq!(proxy.to_vec(), fresh.to_vec());
        }
    }

    #[test]
    fn filtered_view_emits_at_most_one_change_per_primitive(
        initial in initial_strategy(),
        ops in proptest::collection::vec(op_strategy(), 1..30),
    ) {
        let seq = ObservableSeq::from_vec(initial);
        let proxy = FilteringProxy::new(&seq, keep);

        let source_events = Rc::new(RefCell::new(0usize));
        let derived_events = Rc::new(RefCell::new(0usize));
        let (s, d) = (Rc::clone(&source_events), Rc::clone(&derived_events));
        let _s = seq.subscribe(move |_| *s.borrow_mut() += 1);
        let _d = proxy.subscribe(move |_| *d.borrow_mut() += 1);

        for op in &ops {
            let _ = apply_observable(&seq, op);
            prop_assert!(*derived_events.borrow() <= *source_events.borrow());
        }
    }
}
