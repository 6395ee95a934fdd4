//! Async processors: suspension, resumption across cycles, superseded runs
//! and disposal while suspended.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use serde_json::json;
use trax_core::{ComputeResult, Processor, Store, Trax, Value, defer};
use trax_harness::log_fmt::{errors, event_data};

// ── Helpers ──────────────────────────────────────────────────────────

/// Reads `v`, yields once, then copies it into `out`.
fn async_copy(store: &Store) -> Processor {
    let root = store.root().expect("root");
    store.compute_async("AsyncCopy", move |_| {
        let r = root.clone();
        async move {
            let v = r.get("v");
            defer(()).await;
            r.set("out", v);
            ComputeResult::Ok(())
        }
    })
}

fn out_writes(trax: &Trax) -> Vec<serde_json::Value> {
    event_data(trax.log(), "!SET")
        .into_iter()
        .filter(|d| d["propName"] == "out")
        .map(|d| d["toValue"].clone())
        .collect()
}

// ═════════════════════════════════════════════════════════════════════════
// Suspension and resumption
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn first_run_completes_on_the_executor() {
    let trax = Trax::default();
    let store = trax.create_store_from("A", json!({"v": 1, "out": 0}));
    let p = async_copy(&store);
    let root = store.root().unwrap();

    assert_eq!(p.compute_count(), 1);
    assert_eq!(root.get("out").as_f64(), Some(0.0));
    trax.run_until_stalled().unwrap();
    assert_eq!(root.get("out").as_f64(), Some(1.0));
    assert!(p.has_dependency("A/root", "v"));
    assert!(errors(trax.log()).is_empty(), "{:?}", errors(trax.log()));
}

#[test]
fn compute_context_pauses_and_resumes() {
    let trax = Trax::default();
    let store = trax.create_store_from("A", json!({"v": 1, "out": 0}));
    async_copy(&store);
    trax.run_until_stalled().unwrap();

    let mut compute_id = None;
    let mut seen = Vec::new();
    trax.log().scan(|e| {
        if e.kind == "!PCS" && e.field("processorId") == Some(&json!("A%AsyncCopy")) {
            compute_id = Some(e.id.clone());
        }
        if compute_id.is_some() && e.parent_id == compute_id {
            seen.push(e.kind.clone());
        }
        true
    });
    assert_eq!(seen, vec!["!GET", "!PCP", "!PCR", "!SET", "!PCE"]);
}

#[test]
fn resumes_when_an_external_signal_arrives() {
    let trax = Trax::default();
    let store = trax.create_store_from("Fetch", json!({"url": "a", "out": 0}));
    let root = store.root().unwrap();
    let (tx, rx) = oneshot::channel::<f64>();
    let pending = Rc::new(RefCell::new(Some(rx)));

    let r = root.clone();
    store.compute_async("Load", move |_| {
        let r = r.clone();
        let rx = pending.borrow_mut().take();
        async move {
            r.get("url");
            if let Some(rx) = rx {
                if let Ok(n) = rx.await {
                    r.set("out", n);
                }
            }
            ComputeResult::Ok(())
        }
    });

    // The cycle closes while the computation is still suspended.
    trax.run_until_stalled().unwrap();
    assert!(!trax.log().cycle_open());
    assert_eq!(root.get("out").as_f64(), Some(0.0));

    tx.send(42.0).unwrap();
    trax.run_until_stalled().unwrap();
    assert_eq!(root.get("out").as_f64(), Some(42.0));
    assert!(errors(trax.log()).is_empty(), "{:?}", errors(trax.log()));
}

// ═════════════════════════════════════════════════════════════════════════
// Cancellation
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn superseded_run_is_dropped() {
    let trax = Trax::default();
    let store = trax.create_store_from("A", json!({"v": 1, "out": 0}));
    let p = async_copy(&store);
    let root = store.root().unwrap();

    root.set("v", 2);
    assert!(p.is_dirty());
    trax.process_changes();
    assert_eq!(p.compute_count(), 2);
    trax.run_until_stalled().unwrap();

    assert_eq!(root.get("out").as_f64(), Some(2.0));
    assert_eq!(out_writes(&trax), vec![json!(2)]);
}

#[test]
fn dispose_cancels_a_suspended_run() {
    let trax = Trax::default();
    let store = trax.create_store_from("A", json!({"v": 1, "out": 0}));
    let p = async_copy(&store);
    assert!(p.dispose());
    trax.run_until_stalled().unwrap();
    assert_eq!(store.root().unwrap().get("out").as_f64(), Some(0.0));
    assert!(out_writes(&trax).is_empty());
}

/// Counts its drops.
struct DropCount(Rc<Cell<usize>>);

impl Drop for DropCount {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

/// A processor whose runs wait on channels the test never sends to.
fn parked(
    store: &Store,
    dropped: &Rc<Cell<usize>>,
    senders: &Rc<RefCell<Vec<oneshot::Sender<()>>>>,
) -> Processor {
    let root = store.root().expect("root");
    let senders = Rc::clone(senders);
    let dropped = Rc::clone(dropped);
    store.compute_async("Parked", move |_| {
        let r = root.clone();
        let (tx, rx) = oneshot::channel::<()>();
        senders.borrow_mut().push(tx);
        let guard = DropCount(Rc::clone(&dropped));
        async move {
            let _guard = guard;
            r.get("v");
            let _ = rx.await;
            ComputeResult::Ok(())
        }
    })
}

#[test]
fn stale_runs_are_released_without_their_signal() {
    let trax = Trax::default();
    let store = trax.create_store_from("W", json!({"v": 1}));
    let dropped = Rc::new(Cell::new(0));
    let senders = Rc::new(RefCell::new(Vec::new()));
    let p = parked(&store, &dropped, &senders);
    trax.run_until_stalled().unwrap();
    assert_eq!(dropped.get(), 0);

    // A new run supersedes the suspended one.
    store.root().unwrap().set("v", 2);
    trax.process_changes();
    assert_eq!(p.compute_count(), 2);
    trax.run_until_stalled().unwrap();
    assert_eq!(dropped.get(), 1);

    assert!(p.dispose());
    trax.run_until_stalled().unwrap();
    assert_eq!(dropped.get(), 2);
    // Both receivers went away with their runs.
    assert!(senders.borrow().iter().all(oneshot::Sender::is_canceled));
    assert!(errors(trax.log()).is_empty(), "{:?}", errors(trax.log()));
}

#[test]
fn late_errors_are_reported() {
    let trax = Trax::default();
    let store = trax.create_store_from("E", json!({"v": 1}));
    let root = store.root().unwrap();
    store.compute_async("Fail", move |_| {
        let r = root.clone();
        async move {
            r.get("v");
            defer(()).await;
            ComputeResult::Err("late failure".into())
        }
    });
    assert!(errors(trax.log()).is_empty());
    trax.run_until_stalled().unwrap();
    assert_eq!(errors(trax.log()), vec!["(E%Fail) Compute error: late failure"]);
}

#[test]
fn synchronous_prefix_writes_are_visible_immediately() {
    let trax = Trax::default();
    let store = trax.create_store_from("S", json!({"v": 3, "early": 0, "late": 0}));
    let root = store.root().unwrap();
    let r = root.clone();
    store.compute_async("Split", move |_| {
        let r = r.clone();
        async move {
            let v = r.get("v");
            r.set("early", v.clone());
            defer(()).await;
            r.set("late", v);
            ComputeResult::Ok(())
        }
    });
    assert_eq!(root.get("early"), Value::Number(3.0));
    assert_eq!(root.get("late"), Value::Number(0.0));
    trax.run_until_stalled().unwrap();
    assert_eq!(root.get("late"), Value::Number(3.0));
}
