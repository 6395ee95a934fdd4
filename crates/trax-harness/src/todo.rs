#![forbid(unsafe_code)]

//! Reference Todo store.
//!
//! Root layout:
//!
//! ```text
//! { todos: [{id, description, completed}], filter: "ALL" | "ACTIVE" | "COMPLETED",
//!   itemsLeft, nbrOfCompletedTodos, listView: [..] }
//! ```
//!
//! `Counters` maintains the two counts, `ListView` the filtered view. Both
//! run at reconciliation; call [`Trax::process_changes`] or await
//! [`Trax::reconciliation`] after mutating.

use std::cell::Cell;

use serde_json::json;
use trax_core::{Store, Trax, TraxObject, Value};

pub const STORE_ID: &str = "TodoStore";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TodoFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TodoFilter {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ALL" => Some(Self::All),
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }

    fn accepts(self, item: &TraxObject) -> bool {
        match self {
            Self::All => true,
            Self::Active => !is_completed(item),
            Self::Completed => is_completed(item),
        }
    }
}

/// Todo items currently in `root.todos`, in order.
fn items(root: &TraxObject) -> Vec<TraxObject> {
    root.get_object("todos")
        .map(|todos| todos.values().into_iter().filter_map(Value::into_object).collect())
        .unwrap_or_default()
}

#[must_use]
pub fn is_completed(item: &TraxObject) -> bool {
    item.get("completed").as_bool() == Some(true)
}

#[must_use]
pub fn description(item: &TraxObject) -> String {
    item.get("description").as_str().unwrap_or_default().to_owned()
}

/// Operations of the Todo store.
pub struct TodoApi {
    store: Store,
    root: TraxObject,
    next_id: Cell<u64>,
}

impl TodoApi {
    #[must_use]
    pub fn root(&self) -> &TraxObject {
        &self.root
    }

    /// Append an active item; returns it.
    pub fn add_todo(&self, desc: &str) -> Option<TraxObject> {
        self.store
            .action("addTodo", || {
                let todos = self.root.get_object("todos")?;
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                let len = todos.push(json!({ "id": id, "description": desc, "completed": false }));
                todos.get_object(&(len - 1).to_string())
            })
            .flatten()
    }

    pub fn set_completed(&self, item: &TraxObject, completed: bool) {
        self.store.action("setCompleted", || {
            item.set("completed", completed);
        });
    }

    /// Remove `item` from the list. Returns whether it was found.
    pub fn delete_todo(&self, item: &TraxObject) -> bool {
        self.store
            .action("deleteTodo", || {
                let todos = self.root.get_object("todos")?;
                let index = items(&self.root).iter().position(|t| t == item)?;
                todos.remove(index);
                Some(())
            })
            .flatten()
            .is_some()
    }

    /// Drop every completed item.
    pub fn clear_completed(&self) {
        self.store.action("clearCompleted", || {
            let Some(todos) = self.root.get_object("todos") else {
                return;
            };
            let remaining: Vec<Value> = items(&self.root)
                .into_iter()
                .filter(|item| !is_completed(item))
                .map(Value::from)
                .collect();
            self.root.trax().update_array(&todos, remaining);
        });
    }

    /// Complete every item, or reactivate all of them if all are completed.
    pub fn toggle_all_completed(&self) {
        self.store.action("toggleAllCompleted", || {
            let all = items(&self.root);
            let completed = !all.iter().all(is_completed);
            for item in &all {
                item.set("completed", completed);
            }
        });
    }

    pub fn set_filter(&self, filter: TodoFilter) {
        self.store.action("setFilter", || {
            self.root.set("filter", filter.as_str());
        });
    }

    // ── Views ────────────────────────────────────────────────────────

    #[must_use]
    pub fn todos(&self) -> Vec<TraxObject> {
        items(&self.root)
    }

    #[must_use]
    pub fn list_view(&self) -> Vec<TraxObject> {
        self.root
            .get_object("listView")
            .map(|view| view.values().into_iter().filter_map(Value::into_object).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn items_left(&self) -> u64 {
        self.count("itemsLeft")
    }

    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.count("nbrOfCompletedTodos")
    }

    fn count(&self, field: &str) -> u64 {
        self.root.get(field).as_f64().map_or(0, |n| n as u64)
    }
}

/// Create the Todo store in `trax`.
pub fn create_todo_store(trax: &Trax) -> Store<TodoApi> {
    trax.create_store(STORE_ID, |store| {
        let root = store.init(json!({
            "todos": [],
            "filter": TodoFilter::All.as_str(),
            "itemsLeft": 0,
            "nbrOfCompletedTodos": 0,
            "listView": [],
        }));

        let r = root.clone();
        store.compute("Counters", move |_| {
            let (done, left): (Vec<_>, Vec<_>) = items(&r).into_iter().partition(is_completed);
            r.set("itemsLeft", left.len());
            r.set("nbrOfCompletedTodos", done.len());
            Ok(())
        });

        let r = root.clone();
        store.compute("ListView", move |_| {
            let filter = r
                .get("filter")
                .as_str()
                .and_then(TodoFilter::parse)
                .unwrap_or_default();
            let visible: Vec<Value> = items(&r)
                .into_iter()
                .filter(|item| filter.accepts(item))
                .map(Value::from)
                .collect();
            let view = r.get_object("listView").ok_or("listView missing")?;
            r.trax().update_array(&view, visible);
            Ok(())
        });

        tracing::debug!(target: "trax::todo", "todo store initialized");
        TodoApi {
            store: store.clone(),
            root,
            next_id: Cell::new(1),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_names_round_trip() {
        for f in [TodoFilter::All, TodoFilter::Active, TodoFilter::Completed] {
            assert_eq!(TodoFilter::parse(f.as_str()), Some(f));
        }
        assert_eq!(TodoFilter::parse("done"), None);
    }

    #[test]
    fn empty_store_has_zero_counts() {
        let trax = Trax::default();
        let store = create_todo_store(&trax);
        assert_eq!(store.api().items_left(), 0);
        assert_eq!(store.api().completed_count(), 0);
        assert!(store.api().list_view().is_empty());
        assert!(store.get_processor("Counters").is_some());
        assert!(store.get_processor("ListView").is_some());
    }
}
