//! End-to-end scenarios on the reference Todo store.
//!
//! Each test drives the store through its API, reconciles, then checks the
//! derived fields (`itemsLeft`, `nbrOfCompletedTodos`, `listView`) and the
//! event log.

use trax_core::{Trax, TraxObject};
use trax_harness::log_fmt::{errors, event_data, format_log};
use trax_harness::todo::{TodoFilter, create_todo_store, description, is_completed};

// ── Helpers ──────────────────────────────────────────────────────────

fn names(items: &[TraxObject]) -> Vec<String> {
    items.iter().map(description).collect()
}

fn completion(items: &[TraxObject]) -> Vec<bool> {
    items.iter().map(is_completed).collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn seeded(trax: &Trax) -> (trax_core::Store<trax_harness::todo::TodoApi>, Vec<TraxObject>) {
    init_tracing();
    let store = create_todo_store(trax);
    let items: Vec<TraxObject> = ["A", "B", "C", "D"]
        .iter()
        .map(|d| store.api().add_todo(d).expect("item"))
        .collect();
    trax.process_changes();
    (store, items)
}

// ═════════════════════════════════════════════════════════════════════════
// Counters and list
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn counts_follow_completion_and_deletion() {
    let trax = Trax::default();
    let (store, items) = seeded(&trax);
    let api = store.api();
    assert_eq!(api.items_left(), 4);
    assert_eq!(api.completed_count(), 0);

    api.set_completed(&items[1], true);
    api.set_completed(&items[2], true);
    trax.process_changes();
    assert_eq!(api.items_left(), 2);
    assert_eq!(api.completed_count(), 2);

    assert!(api.delete_todo(&items[1]));
    trax.process_changes();
    assert_eq!(api.items_left(), 2);
    assert_eq!(api.completed_count(), 1);
    assert_eq!(names(&api.todos()), vec!["A", "C", "D"]);
    assert_eq!(names(&api.list_view()), vec!["A", "C", "D"]);

    api.clear_completed();
    trax.process_changes();
    assert_eq!(names(&api.todos()), vec!["A", "D"]);
    assert_eq!(api.items_left(), 2);
    assert_eq!(api.completed_count(), 0);

    let before = completion(&api.todos());
    api.toggle_all_completed();
    trax.process_changes();
    assert_eq!(completion(&api.todos()), vec![true, true]);
    assert_eq!(api.items_left(), 0);
    api.toggle_all_completed();
    trax.process_changes();
    assert_eq!(completion(&api.todos()), before);
    assert_eq!(api.items_left(), 2);

    assert!(errors(trax.log()).is_empty(), "{:?}", errors(trax.log()));
}

#[test]
fn active_filter_hides_completed_items() {
    let trax = Trax::default();
    let (store, items) = seeded(&trax);
    let api = store.api();
    api.set_completed(&items[1], true);
    api.set_completed(&items[2], true);
    trax.process_changes();

    api.set_filter(TodoFilter::Active);
    trax.process_changes();
    assert_eq!(names(&api.list_view()), vec!["A", "D"]);
    assert_eq!(names(&api.todos()), vec!["A", "B", "C", "D"]);
    assert_eq!(api.items_left(), 2);
    assert_eq!(api.completed_count(), 2);

    // View items are the list items themselves.
    assert_eq!(api.list_view()[0], items[0]);

    api.set_filter(TodoFilter::Completed);
    trax.process_changes();
    assert_eq!(names(&api.list_view()), vec!["B", "C"]);

    api.set_filter(TodoFilter::All);
    trax.process_changes();
    assert_eq!(api.list_view().len(), 4);
}

#[test]
fn deleting_an_unknown_item_is_a_no_op() {
    let trax = Trax::default();
    let (store, items) = seeded(&trax);
    let api = store.api();
    assert!(api.delete_todo(&items[0]));
    assert!(!api.delete_todo(&items[0]));
    trax.process_changes();
    assert_eq!(api.items_left(), 3);
}

// ═════════════════════════════════════════════════════════════════════════
// Event log
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn actions_and_computations_are_logged() {
    let trax = Trax::default();
    let (store, items) = seeded(&trax);
    store.api().set_completed(&items[0], true);
    trax.process_changes();

    let actions: Vec<String> = event_data(trax.log(), "!PCS")
        .iter()
        .filter(|d| d["name"] == "!StoreAction")
        .map(|d| d["action"].as_str().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(
        actions,
        vec!["addTodo", "addTodo", "addTodo", "addTodo", "setCompleted"]
    );

    let triggers: Vec<(String, String)> = event_data(trax.log(), "!PCS")
        .iter()
        .filter(|d| d["name"] == "!Compute")
        .map(|d| {
            (
                d["processorId"].as_str().unwrap_or_default().to_owned(),
                d["trigger"].as_str().unwrap_or_default().to_owned(),
            )
        })
        .collect();
    assert_eq!(
        triggers[..2],
        [
            ("TodoStore%Counters".to_owned(), "Init".to_owned()),
            ("TodoStore%ListView".to_owned(), "Init".to_owned()),
        ]
    );
    assert!(
        triggers[2..]
            .iter()
            .all(|(_, trigger)| trigger == "Reconciliation")
    );

    let dirty = format_log(trax.log(), &["!DRT"]);
    assert!(
        dirty
            .iter()
            .any(|l| l.contains(r#""processorId":"TodoStore%Counters""#)
                && l.contains(r#""propName":"completed""#))
    );
}

#[test]
fn reconciliation_runs_on_cycle_flush() {
    let trax = Trax::default();
    let store = create_todo_store(&trax);
    trax.run_until_stalled().unwrap();

    store.api().add_todo("X").unwrap();
    assert_eq!(store.api().items_left(), 0);
    trax.block_on(trax.reconciliation()).unwrap();
    assert_eq!(store.api().items_left(), 1);
    assert_eq!(names(&store.api().list_view()), vec!["X"]);
}

#[test]
fn disposing_the_store_stops_processing() {
    let trax = Trax::default();
    let (store, items) = seeded(&trax);
    let counters = store.get_processor("Counters").unwrap();
    assert!(store.dispose());
    assert!(counters.is_disposed());
    assert!(!store.api().root().is_live());

    store.api().set_completed(&items[0], true);
    assert!(!trax.pending_changes());
    assert!(
        errors(trax.log())
            .iter()
            .any(|m| m == "(TodoStore) Store disposed: setCompleted ignored")
    );
}
