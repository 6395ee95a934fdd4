//! Property-based tests for the pooled linked list.
//!
//! Every operation sequence is mirrored on a `Vec` model:
//!
//! 1. Contents and order match the model after each step
//! 2. `len()` matches the model
//! 3. The arena never grows beyond the peak number of live items
//! 4. Ordered insertion keeps a sorted list sorted (stable for equal keys)

use proptest::prelude::*;
use trax_core::linked_list::LinkedList;

// ── Strategies ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Shift,
    InsertOrdered(u8),
    Remove(u8),
    Clear,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u8>().prop_map(Op::Push),
        3 => Just(Op::Shift),
        3 => any::<u8>().prop_map(Op::InsertOrdered),
        2 => (0u8..8).prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

fn apply(list: &mut LinkedList<u8>, model: &mut Vec<u8>, op: &Op) {
    match *op {
        Op::Push(v) => {
            list.push(v);
            model.insert(0, v);
        }
        Op::Shift => {
            let expected = (!model.is_empty()).then(|| model.remove(0));
            assert_eq!(list.shift(), expected);
        }
        Op::InsertOrdered(v) => {
            list.insert(v, |new, existing| new <= existing);
            let at = model.iter().position(|e| v <= *e).unwrap_or(model.len());
            model.insert(at, v);
        }
        Op::Remove(v) => {
            let expected = model.iter().position(|e| *e == v).map(|i| model.remove(i));
            assert_eq!(list.remove_first(|e| *e == v), expected);
        }
        Op::Clear => {
            list.clear();
            model.clear();
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1–3. Model equivalence and slot reuse
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn matches_vec_model(ops in proptest::collection::vec(arb_op(), 0..200)) {
        let mut list = LinkedList::new();
        let mut model = Vec::new();
        let mut peak = 0;
        for op in &ops {
            apply(&mut list, &mut model, op);
            peak = peak.max(model.len());
            prop_assert_eq!(list.len(), model.len());
            prop_assert_eq!(list.iter().copied().collect::<Vec<_>>(), model.clone());
            prop_assert_eq!(list.peek().copied(), model.first().copied());
            prop_assert!(list.capacity() <= peak);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Ordered insertion
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn ordered_insert_sorts(values in proptest::collection::vec(0u8..16, 0..64)) {
        let mut list = LinkedList::new();
        for (seq, v) in values.iter().enumerate() {
            list.insert((*v, seq), |new, existing| new.0 < existing.0);
        }
        let out: Vec<(u8, usize)> = list.iter().copied().collect();
        let mut sorted = out.clone();
        sorted.sort();
        // Sorting by (key, seq) equals the list: equal keys keep arrival order.
        prop_assert_eq!(out, sorted);
    }
}
