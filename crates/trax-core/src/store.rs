#![forbid(unsafe_code)]

//! Stores: disposable namespaces grouping data, processors and sub-stores.
//!
//! A store owns a root object (`<store>/root`), the processors created
//! through it and its sub-stores. Other data objects registered with
//! [`Store::add`] live as long as something holds them. Disposing a store
//! disposes all of it, depth first.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::{Value as Json, json};

use crate::error::{BoxError, ComputeResult, TraxError};
use crate::object::{ObjectKind, TraxObject};
use crate::processor::{
    ComputeContext, ComputeFn, ComputeTrigger, Processor, ProcessorDef, ProcessorOptions,
};
use crate::runtime::{Runtime, Trax};
use crate::stream::TraxEvent;
use crate::wrapper::{StepHooks, Tracked, run_sync};

const ROOT_ID: &str = "root";

/// Body of a content processor: receives the object it maintains.
pub type ContentFn = Rc<dyn Fn(&TraxObject, &ComputeContext) -> ComputeResult>;

/// Options for [`Store::add_with`] and [`Store::init_with`].
#[derive(Clone, Default)]
pub struct AddOptions {
    /// `Some(Dictionary)` marks an object used as a key/value map.
    pub kind: Option<ObjectKind>,
    /// Wrap level per field name, inherited by wrapped descendants.
    /// Level 1 stores plain data as is.
    pub ref_fields: AHashMap<String, u8>,
    processors: Vec<(String, ContentFn)>,
}

impl fmt::Debug for AddOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddOptions")
            .field("kind", &self.kind)
            .field("ref_fields", &self.ref_fields)
            .field(
                "processors",
                &self.processors.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AddOptions {
    #[must_use]
    pub fn with_kind(mut self, kind: ObjectKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_ref_field(mut self, field: impl Into<String>, level: u8) -> Self {
        self.ref_fields.insert(field.into(), level);
        self
    }

    /// Attach a lazy processor computing the object's content. It runs when
    /// the object is read while dirty, or on [`Processor::compute`].
    #[must_use]
    pub fn with_processor(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&TraxObject, &ComputeContext) -> ComputeResult + 'static,
    ) -> Self {
        self.processors.push((name.into(), Rc::new(f)));
        self
    }
}

pub(crate) struct StoreInner {
    id: String,
    rt: Rc<Runtime>,
    parent: Option<Weak<StoreInner>>,
    root: RefCell<Option<TraxObject>>,
    processors: RefCell<IndexMap<String, Processor>>,
    sub_stores: RefCell<IndexMap<String, Rc<StoreInner>>>,
    api: RefCell<Option<Rc<dyn Any>>>,
    disposed: Cell<bool>,
}

impl StoreInner {
    pub(crate) fn forget_processor(&self, name: &str) {
        if let Ok(mut processors) = self.processors.try_borrow_mut() {
            processors.shift_remove(name);
        }
    }
}

/// Handle on a store carrying its user API `A`.
pub struct Store<A = ()> {
    inner: Rc<StoreInner>,
    api: Rc<A>,
}

impl<A> Clone for Store<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            api: Rc::clone(&self.api),
        }
    }
}

impl<A> fmt::Debug for Store<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("disposed", &self.inner.disposed.get())
            .field("processors", &self.inner.processors.borrow().len())
            .field("sub_stores", &self.inner.sub_stores.borrow().len())
            .finish()
    }
}

impl Store {
    pub(crate) fn from_inner(inner: Rc<StoreInner>) -> Option<Self> {
        (!inner.disposed.get()).then(|| Self {
            inner,
            api: Rc::new(()),
        })
    }
}

impl<A: 'static> Store<A> {
    pub(crate) fn create(
        rt: &Rc<Runtime>,
        parent: Option<&Rc<StoreInner>>,
        id: &str,
        init: impl FnOnce(&Store) -> A,
    ) -> Self {
        let local = rt.sanitize_id(id);
        let requested = match parent {
            Some(parent) => format!("{}>{}", parent.id, local),
            None => local,
        };
        let id = rt.unique_store_id(&requested);
        if id != requested {
            rt.report(TraxError::DuplicateStoreId {
                id: requested,
                assigned: id.clone(),
            });
        }

        let inner = Rc::new(StoreInner {
            id: id.clone(),
            rt: Rc::clone(rt),
            parent: parent.map(Rc::downgrade),
            root: RefCell::new(None),
            processors: RefCell::new(IndexMap::new()),
            sub_stores: RefCell::new(IndexMap::new()),
            api: RefCell::new(None),
            disposed: Cell::new(false),
        });
        rt.register_store(&id, &inner);
        if let Some(parent) = parent {
            parent
                .sub_stores
                .borrow_mut()
                .insert(id.clone(), Rc::clone(&inner));
        }
        rt.emit(TraxEvent::New, json!({ "objectId": id, "objectType": "S" }));

        let shell = Store {
            inner: Rc::clone(&inner),
            api: Rc::new(()),
        };
        let api = run_sync(
            &rt.log,
            json!({ "name": "!StoreInit", "storeId": id }),
            || init(&shell),
        );
        if inner.root.borrow().is_none() {
            rt.report(TraxError::MissingRoot {
                store_id: id.clone(),
            });
            shell.init(json!({}));
        }

        let api = Rc::new(api);
        *inner.api.borrow_mut() = Some(Rc::clone(&api) as Rc<dyn Any>);
        tracing::debug!(target: "trax", store_id = %id, "store created");
        Self { inner, api }
    }

    /// The same store seen through another API type, if `B` is the type its
    /// init function returned.
    #[must_use]
    pub fn with_api<B: 'static>(&self) -> Option<Store<B>> {
        let api = self.inner.api.borrow().clone()?.downcast::<B>().ok()?;
        Some(Store {
            inner: Rc::clone(&self.inner),
            api,
        })
    }

    /// Create a sub-store with id `<this store>><id>`.
    pub fn create_store<B: 'static>(&self, id: &str, init: impl FnOnce(&Store) -> B) -> Store<B> {
        if self.check_disposed("create_store") {
            let orphan = Store::create(&self.inner.rt, None, id, init);
            orphan.dispose();
            return orphan;
        }
        Store::create(&self.inner.rt, Some(&self.inner), id, init)
    }
}

impl<A> Store<A> {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// User API returned by the init function.
    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    #[must_use]
    pub fn trax(&self) -> Trax {
        Trax::from_runtime(Rc::clone(&self.inner.rt))
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Root object, once initialized.
    #[must_use]
    pub fn root(&self) -> Option<TraxObject> {
        self.inner.root.borrow().clone()
    }

    /// Report and return `true` if the store is disposed.
    fn check_disposed(&self, operation: &str) -> bool {
        if !self.inner.disposed.get() {
            return false;
        }
        self.inner.rt.report(TraxError::StoreDisposed {
            store_id: self.inner.id.clone(),
            operation: operation.to_owned(),
        });
        true
    }

    // ── Data ─────────────────────────────────────────────────────────

    /// Set the root object. Returns the existing root if already set.
    pub fn init(&self, root: Json) -> TraxObject {
        self.init_with(root, AddOptions::default())
    }

    pub fn init_with(&self, root: Json, options: AddOptions) -> TraxObject {
        if let Some(existing) = self.root() {
            return existing;
        }
        let root = self.add_data(ROOT_ID, root, options);
        if !self.inner.disposed.get() {
            *self.inner.root.borrow_mut() = Some(root.clone());
        }
        root
    }

    /// Register a data object with id `<store>/<id>`. Returns the live
    /// object if the id is taken.
    pub fn add(&self, id: &str, data: Json) -> TraxObject {
        self.add_with(id, data, AddOptions::default())
    }

    pub fn add_with(&self, id: &str, data: Json, options: AddOptions) -> TraxObject {
        let id = self.inner.rt.sanitize_id(id);
        if id == ROOT_ID {
            self.inner.rt.report(TraxError::ReservedId { id });
            return self
                .root()
                .unwrap_or_else(|| TraxObject::detached(&self.inner.rt, json!({})));
        }
        self.add_data(&id, data, options)
    }

    fn add_data(&self, id: &str, data: Json, options: AddOptions) -> TraxObject {
        let rt = &self.inner.rt;
        if self.check_disposed("add") {
            return TraxObject::detached(rt, data);
        }
        let object_id = format!("{}/{}", self.inner.id, id);
        if let Some(existing) = rt.get_object(&object_id) {
            return existing;
        }
        let data = match data {
            data @ (Json::Object(_) | Json::Array(_)) => data,
            _ => {
                rt.report(TraxError::InvalidInitValue {
                    store_id: self.inner.id.clone(),
                    id: id.to_owned(),
                });
                json!({})
            }
        };
        let object = TraxObject::create(
            rt,
            object_id,
            self.inner.id.clone(),
            data,
            options.kind,
            0,
            Rc::new(options.ref_fields),
        );
        for (name, f) in options.processors {
            self.attach_content_processor(&object, id, &name, f);
        }
        object
    }

    fn attach_content_processor(&self, object: &TraxObject, data_id: &str, name: &str, f: ContentFn) {
        let rt = &self.inner.rt;
        let local = format!("{data_id}[{name}]");
        let target = object.downgrade();
        let weak = target.clone();
        let body = ComputeFn::sync(move |cx| match weak.upgrade() {
            Some(node) => f(&TraxObject::from_inner(node), cx),
            None => Ok(()),
        });
        let processor = Processor::new(
            rt,
            Rc::downgrade(&self.inner),
            ProcessorDef {
                id: format!("{}%{}", self.inner.id, local),
                name: local.clone(),
                store_id: self.inner.id.clone(),
                priority: rt.next_priority(),
                options: ProcessorOptions::default().lazy(),
                target: Some(target),
            },
            body,
        );
        self.register(local, &processor);
        object.attach_content_processor(processor);
    }

    /// Live data object `<store>/<id>`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<TraxObject> {
        self.inner
            .rt
            .get_object(&format!("{}/{}", self.inner.id, id))
    }

    /// Dispose a data object of this store. The root cannot be removed.
    pub fn remove(&self, object: &TraxObject) -> bool {
        if self.check_disposed("remove") {
            return false;
        }
        let rt = &self.inner.rt;
        if object.store_id() != self.inner.id {
            rt.report(TraxError::ForeignObject {
                store_id: self.inner.id.clone(),
                object_id: object.id().to_owned(),
            });
            return false;
        }
        if self.root().as_ref() == Some(object) {
            rt.report(TraxError::RootRemoval {
                store_id: self.inner.id.clone(),
            });
            return false;
        }
        object.dispose()
    }

    // ── Processors ───────────────────────────────────────────────────

    /// Create a processor and run it once. Returns the live processor if
    /// `id` is taken.
    pub fn compute(
        &self,
        id: &str,
        f: impl Fn(&ComputeContext) -> ComputeResult + 'static,
    ) -> Processor {
        self.compute_with(id, ComputeFn::sync(f), ProcessorOptions::default())
    }

    /// Like [`compute`](Self::compute) with a body returning a future.
    pub fn compute_async<F, Fut>(&self, id: &str, f: F) -> Processor
    where
        F: Fn(ComputeContext) -> Fut + 'static,
        Fut: Future<Output = ComputeResult> + 'static,
    {
        self.compute_with(id, ComputeFn::future(f), ProcessorOptions::default())
    }

    pub fn compute_with(&self, id: &str, body: ComputeFn, options: ProcessorOptions) -> Processor {
        let rt = &self.inner.rt;
        let name = rt.sanitize_id(id);
        let def = ProcessorDef {
            id: format!("{}%{}", self.inner.id, name),
            name: name.clone(),
            store_id: self.inner.id.clone(),
            priority: 0,
            options,
            target: None,
        };
        if self.check_disposed("compute") {
            return Processor::new(rt, Weak::new(), def, body).into_inert();
        }
        if let Some(existing) = self.get_processor(&name) {
            return existing;
        }
        let def = ProcessorDef {
            priority: rt.next_priority(),
            ..def
        };
        let processor = Processor::new(rt, Rc::downgrade(&self.inner), def, body);
        self.register(name, &processor);
        processor.compute_with(false, ComputeTrigger::Init, None);
        processor
    }

    fn register(&self, name: String, processor: &Processor) {
        let rt = &self.inner.rt;
        rt.register_processor(processor);
        self.inner
            .processors
            .borrow_mut()
            .insert(name, processor.clone());
        rt.emit(
            TraxEvent::New,
            json!({ "objectId": processor.id(), "objectType": "P" }),
        );
    }

    /// Live processor by local id (`"Name"`, or `"data[name]"` for content
    /// processors).
    #[must_use]
    pub fn get_processor(&self, id: &str) -> Option<Processor> {
        self.inner
            .processors
            .borrow()
            .get(id)
            .filter(|p| !p.is_disposed())
            .cloned()
    }

    /// Live sub-store by local id.
    #[must_use]
    pub fn get_store(&self, id: &str) -> Option<Store> {
        let full = format!("{}>{}", self.inner.id, id);
        let inner = self.inner.sub_stores.borrow().get(&full).cloned()?;
        Store::from_inner(inner)
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Run `f` inside a `!StoreAction` context. `None` if the store is
    /// disposed.
    pub fn action<R>(&self, name: &str, f: impl FnOnce() -> R) -> Option<R> {
        if self.check_disposed(name) {
            return None;
        }
        let data = json!({ "name": "!StoreAction", "storeId": self.inner.id, "action": name });
        Some(run_sync(&self.inner.rt.log, data, f))
    }

    /// Like [`action`](Self::action); an `Err` is reported and yields `None`.
    pub fn try_action<R>(&self, name: &str, f: impl FnOnce() -> Result<R, BoxError>) -> Option<R> {
        match self.action(name, f)? {
            Ok(out) => Some(out),
            Err(err) => {
                self.inner.rt.report(TraxError::Action {
                    store_id: self.inner.id.clone(),
                    action: name.to_owned(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    /// Run `future` as a `!StoreAction` context spanning its suspensions.
    /// Resolves to `None` if the store is disposed before it completes.
    pub fn async_action<R: 'static>(
        &self,
        name: &str,
        future: impl Future<Output = R> + 'static,
    ) -> impl Future<Output = Option<R>> + 'static {
        self.check_disposed(name);
        let data = json!({ "name": "!StoreAction", "storeId": self.inner.id, "action": name });
        Tracked::new(
            self.inner.rt.log.clone(),
            data,
            future.boxed_local(),
            ActionHooks {
                store: Rc::downgrade(&self.inner),
            },
        )
    }

    // ── Disposal ─────────────────────────────────────────────────────

    /// Dispose sub-stores, processors and data, then the store itself.
    /// Returns `false` if already disposed.
    pub fn dispose(&self) -> bool {
        dispose_inner(&self.inner)
    }
}

fn dispose_inner(inner: &Rc<StoreInner>) -> bool {
    if inner.disposed.replace(true) {
        return false;
    }
    let rt = &inner.rt;

    let sub_stores = std::mem::take(&mut *inner.sub_stores.borrow_mut());
    for sub in sub_stores.values() {
        dispose_inner(sub);
    }
    let processors = std::mem::take(&mut *inner.processors.borrow_mut());
    for processor in processors.values() {
        processor.dispose();
    }
    for object in rt.store_objects(&inner.id) {
        object.dispose();
    }
    inner.root.borrow_mut().take();
    inner.api.borrow_mut().take();

    if let Some(parent) = inner.parent.as_ref().and_then(Weak::upgrade) {
        if let Ok(mut subs) = parent.sub_stores.try_borrow_mut() {
            subs.shift_remove(&inner.id);
        }
    }
    rt.unregister_store(&inner.id);
    rt.emit(TraxEvent::Dispose, json!({ "objectId": inner.id }));
    tracing::debug!(target: "trax", store_id = %inner.id, "store disposed");
    true
}

struct ActionHooks {
    store: Weak<StoreInner>,
}

impl<T> StepHooks<T> for ActionHooks {
    fn is_current(&self) -> bool {
        self.store.upgrade().is_some_and(|s| !s.disposed.get())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::wrapper::defer;

    fn messages(trax: &Trax, kind: &str) -> Vec<String> {
        let mut out = Vec::new();
        trax.log().scan(|e| {
            if e.kind == kind {
                out.push(e.message().unwrap_or_default().to_owned());
            }
            true
        });
        out
    }

    struct CounterApi {
        root: TraxObject,
    }

    impl CounterApi {
        fn increment(&self) {
            let n = self.root.get("count").as_f64().unwrap_or_default();
            self.root.set("count", n + 1.0);
        }
    }

    #[test]
    fn typed_api_from_init() {
        let trax = Trax::default();
        let store = trax.create_store("Counter", |s| CounterApi {
            root: s.init(json!({"count": 0})),
        });
        store.api().increment();
        store.api().increment();
        assert_eq!(store.root().unwrap().get("count").as_f64(), Some(2.0));

        let found = trax.get_store("Counter").unwrap();
        assert!(found.with_api::<CounterApi>().is_some());
        assert!(found.with_api::<String>().is_none());
    }

    #[test]
    fn missing_root_is_reported() {
        let trax = Trax::default();
        let store = trax.create_store("Empty", |_| ());
        assert_eq!(store.root().unwrap().id(), "Empty/root");
        assert!(messages(&trax, "!ERR").iter().any(|m| m.contains("must define a root")));
    }

    #[test]
    fn duplicate_store_ids_get_a_suffix() {
        let trax = Trax::default();
        let a = trax.create_store_from("Dup", json!({}));
        let b = trax.create_store_from("Dup", json!({}));
        assert_eq!(a.id(), "Dup");
        assert_eq!(b.id(), "Dup1");
        assert_eq!(b.root().unwrap().id(), "Dup1/root");
    }

    #[test]
    fn add_is_idempotent_while_live() {
        let trax = Trax::default();
        let store = trax.create_store_from("S", json!({}));
        let first = store.add("item", json!({"v": 1}));
        let second = store.add("item", json!({"v": 2}));
        assert_eq!(first, second);
        assert_eq!(first.get("v").as_f64(), Some(1.0));
        assert_eq!(store.get("item"), Some(first));
    }

    #[test]
    fn invalid_values_and_reserved_ids() {
        let trax = Trax::default();
        let store = trax.create_store_from("S", json!({"a": 1}));
        let bad = store.add("num", json!(3));
        assert_eq!(bad.to_json(), json!({}));
        let root = store.add("root", json!({}));
        assert_eq!(Some(root), store.root());
        let errors = messages(&trax, "!ERR");
        assert!(errors.iter().any(|m| m.contains("invalid init value")));
        assert!(errors.iter().any(|m| m.contains("\"root\" is reserved")));
    }

    #[test]
    fn remove_rules() {
        let trax = Trax::default();
        let a = trax.create_store_from("A", json!({}));
        let b = trax.create_store_from("B", json!({}));
        let item = a.add("item", json!({}));
        assert!(!b.remove(&item));
        assert!(!a.remove(&a.root().unwrap()));
        assert!(a.remove(&item));
        assert!(!a.remove(&item));
        let errors = messages(&trax, "!ERR");
        assert!(errors.iter().any(|m| m.contains("does not belong")));
        assert!(errors.iter().any(|m| m.contains("root objects cannot be removed")));
    }

    #[test]
    fn sub_stores_and_disposal() {
        let trax = Trax::default();
        let parent = trax.create_store_from("App", json!({"v": 1}));
        let child = parent.create_store("Panel", |s| {
            s.init(json!({"open": false}));
        });
        assert_eq!(child.id(), "App>Panel");
        assert!(parent.get_store("Panel").is_some());
        let root = parent.root().unwrap();
        let r = root.clone();
        let p = parent.compute("Watch", move |_| {
            r.get("v");
            Ok(())
        });
        let child_root = child.root().unwrap();

        assert!(parent.dispose());
        assert!(!parent.dispose());
        assert!(child.is_disposed());
        assert!(p.is_disposed());
        assert!(!root.is_live());
        assert!(!child_root.is_live());
        assert!(trax.get_store("App").is_none());
        assert!(trax.get_data("App>Panel/root").is_none());

        let mut deleted = Vec::new();
        trax.log().scan(|e| {
            if e.kind == "!DEL" {
                deleted.push(e.field("objectId").and_then(Json::as_str).unwrap_or_default().to_owned());
            }
            true
        });
        assert_eq!(
            deleted,
            vec!["App>Panel/root", "App>Panel", "App%Watch", "App/root", "App"]
        );
    }

    #[test]
    fn disposed_store_operations_are_reported() {
        let trax = Trax::default();
        let store = trax.create_store_from("Gone", json!({}));
        store.dispose();
        let obj = store.add("x", json!({"a": 1}));
        assert!(!obj.is_live());
        assert_eq!(obj.get("a").as_f64(), Some(1.0));
        let p = store.compute("P", |_| Ok(()));
        assert!(p.is_disposed());
        assert_eq!(p.compute_count(), 0);
        assert_eq!(store.action("noop", || 1), None);
        assert!(
            messages(&trax, "!ERR")
                .iter()
                .any(|m| m == "(Gone) Store disposed: add ignored")
        );
    }

    #[test]
    fn content_processor_runs_on_read() {
        let trax = Trax::default();
        let store = trax.create_store_from("C", json!({"items": [1, 2, 3]}));
        let root = store.root().unwrap();
        let items = root.get_object("items").unwrap();
        let source = items.clone();
        let view = store.add_with(
            "view",
            json!([]),
            AddOptions::default().with_processor("double", move |target, _| {
                let doubled: Vec<Value> = source
                    .values()
                    .iter()
                    .map(|v| Value::from(v.as_f64().unwrap_or_default() * 2.0))
                    .collect();
                target.trax().update_array(target, doubled);
                Ok(())
            }),
        );
        let p = store.get_processor("view[double]").unwrap();
        assert_eq!(p.id(), "C%view[double]");
        assert_eq!(p.target(), Some(view.clone()));
        assert_eq!(p.compute_count(), 0);

        assert_eq!(view.len(), 3);
        assert_eq!(p.compute_count(), 1);
        assert_eq!(view.to_json(), json!([2, 4, 6]));

        items.push(4);
        assert!(p.is_dirty());
        assert!(!trax.pending_changes());
        assert_eq!(view.get_index(3).as_f64(), Some(8.0));
        assert_eq!(p.compute_count(), 2);

        assert!(store.remove(&view));
        assert!(p.is_disposed());
    }

    #[test]
    fn actions_open_contexts() {
        let trax = Trax::default();
        let store = trax.create_store_from("Act", json!({"n": 0}));
        let root = store.root().unwrap();
        let out = store.action("bump", || {
            root.set("n", 1);
            7
        });
        assert_eq!(out, Some(7));
        let failed: Option<()> = store.try_action("fail", || Err("bad input".into()));
        assert_eq!(failed, None);

        let mut actions = Vec::new();
        trax.log().scan(|e| {
            if e.kind == "!PCS" && e.field("name") == Some(&json!("!StoreAction")) {
                actions.push(e.field("action").cloned().unwrap_or_default());
            }
            true
        });
        assert_eq!(actions, vec![json!("bump"), json!("fail")]);
        assert!(
            messages(&trax, "!ERR")
                .iter()
                .any(|m| m == "(Act) Action error in fail: bad input")
        );
    }

    #[test]
    fn async_action_is_dropped_after_dispose() {
        let trax = Trax::default();
        let store = trax.create_store_from("Async", json!({}));
        let done = store.async_action("load", async {
            defer(()).await;
            5
        });
        assert_eq!(trax.block_on(done).unwrap(), Some(5));

        let pending = store.async_action("late", async {
            defer(()).await;
            6
        });
        store.dispose();
        assert_eq!(trax.block_on(pending).unwrap(), None);
    }
}
