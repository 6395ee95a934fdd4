#![forbid(unsafe_code)]

//! The runtime: registries, processor call stack, reconciliation queue and
//! cooperative executor.
//!
//! [`Trax`] is a cheap handle on one runtime. Stores, objects and processors
//! created through it keep the runtime alive.
//!
//! # Cycles
//!
//! The first event of a cycle schedules a flush task on the executor. When
//! the task runs it closes the cycle; with
//! [`TraxConfig::auto_reconciliation`] the queued processors are computed
//! first. Drive the executor with [`Trax::run_until_stalled`] or
//! [`Trax::block_on`], or call [`Trax::process_changes`] directly.
//!
//! # Reconciliation order
//!
//! Non-renderer processors run before renderers; within each group lower
//! priority (earlier creation) runs first. A processor dirtied again during
//! the pass it already ran in is reported as a circular reference. It stays
//! dirty, and the next write to one of its dependencies queues it again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use serde::Serialize;
use serde_json::json;

use crate::config::TraxConfig;
use crate::error::TraxError;
use crate::linked_list::LinkedList;
use crate::object::{NodeInner, ObjectKind, TraxObject};
use crate::processor::{Processor, ProcessorInner};
use crate::store::{Store, StoreInner};
use crate::stream::{EventStream, EventStreamConfig, INTERNAL_KEY, StreamHooks, TraxEvent};
use crate::value::Value;
use crate::wrapper::{defer, run_sync};

/// Separators of the id formats.
fn is_reserved_id_char(c: char) -> bool {
    matches!(c, '/' | '*' | '%' | '>' | '[' | ']') || c.is_whitespace()
}

/// Type label of a runtime entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraxObjectType {
    NotATraxObject,
    Object,
    Array,
    Dictionary,
    Processor,
    Store,
}

impl TraxObjectType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotATraxObject => "",
            Self::Object => "O",
            Self::Array => "A",
            Self::Dictionary => "D",
            Self::Processor => "P",
            Self::Store => "S",
        }
    }
}

/// Anything the runtime can identify.
pub trait TraxHandle {
    /// Id of the live entity, `None` once disposed.
    fn trax_id(&self) -> Option<String>;

    fn trax_type(&self) -> TraxObjectType;
}

impl TraxHandle for TraxObject {
    fn trax_id(&self) -> Option<String> {
        self.is_live().then(|| self.id().to_owned())
    }

    fn trax_type(&self) -> TraxObjectType {
        if self.is_live() {
            self.kind().trax_type()
        } else {
            TraxObjectType::NotATraxObject
        }
    }
}

impl TraxHandle for Processor {
    fn trax_id(&self) -> Option<String> {
        (!self.is_disposed()).then(|| self.id().to_owned())
    }

    fn trax_type(&self) -> TraxObjectType {
        if self.is_disposed() {
            TraxObjectType::NotATraxObject
        } else {
            TraxObjectType::Processor
        }
    }
}

impl<A> TraxHandle for Store<A> {
    fn trax_id(&self) -> Option<String> {
        (!self.is_disposed()).then(|| self.id().to_owned())
    }

    fn trax_type(&self) -> TraxObjectType {
        if self.is_disposed() {
            TraxObjectType::NotATraxObject
        } else {
            TraxObjectType::Store
        }
    }
}

impl TraxHandle for Value {
    fn trax_id(&self) -> Option<String> {
        self.as_object().and_then(TraxHandle::trax_id)
    }

    fn trax_type(&self) -> TraxObjectType {
        self.as_object()
            .map_or(TraxObjectType::NotATraxObject, TraxHandle::trax_type)
    }
}

pub(crate) struct Runtime {
    pub(crate) config: TraxConfig,
    pub(crate) log: EventStream,
    objects: RefCell<AHashMap<String, Weak<NodeInner>>>,
    processors: RefCell<AHashMap<String, Weak<ProcessorInner>>>,
    stores: RefCell<AHashMap<String, Weak<StoreInner>>>,
    call_stack: RefCell<LinkedList<Processor>>,
    queue: RefCell<LinkedList<Processor>>,
    reconciliation_count: Cell<u64>,
    processor_count: Cell<u64>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    weak_self: Weak<Runtime>,
}

impl Runtime {
    fn new(config: TraxConfig) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Runtime>| {
            let log = EventStream::new(EventStreamConfig::default().with_max_size(config.max_log_size));
            let on_start = weak.clone();
            let on_complete = weak.clone();
            log.set_hooks(StreamHooks {
                on_cycle_start: Some(Rc::new(move || {
                    if let Some(rt) = on_start.upgrade() {
                        rt.schedule_flush();
                    }
                })),
                before_cycle_complete: Some(Rc::new(move || {
                    if let Some(rt) = on_complete.upgrade() {
                        if rt.config.auto_reconciliation {
                            rt.process_changes();
                        }
                    }
                })),
            });
            let pool = LocalPool::new();
            let spawner = pool.spawner();
            Self {
                config,
                log,
                objects: RefCell::new(AHashMap::new()),
                processors: RefCell::new(AHashMap::new()),
                stores: RefCell::new(AHashMap::new()),
                call_stack: RefCell::new(LinkedList::new()),
                queue: RefCell::new(LinkedList::new()),
                reconciliation_count: Cell::new(0),
                processor_count: Cell::new(0),
                pool: RefCell::new(pool),
                spawner,
                weak_self: weak.clone(),
            }
        })
    }

    // ── Logging ──────────────────────────────────────────────────────

    pub(crate) fn emit(&self, kind: TraxEvent, data: impl Serialize) {
        self.log.event_with_key(kind.as_str(), data, Some(&INTERNAL_KEY));
    }

    pub(crate) fn report(&self, err: TraxError) {
        self.log.report(err);
    }

    // ── Ids ──────────────────────────────────────────────────────────

    /// Replace characters reserved by id formats.
    pub(crate) fn sanitize_id(&self, id: &str) -> String {
        if !id.contains(is_reserved_id_char) {
            return id.to_owned();
        }
        let sanitized = id.replace(is_reserved_id_char, "_");
        self.report(TraxError::InvalidId {
            original: id.to_owned(),
            sanitized: sanitized.clone(),
        });
        sanitized
    }

    pub(crate) fn unique_object_id(&self, base: &str) -> String {
        unique_id(&self.objects.borrow(), base)
    }

    pub(crate) fn unique_store_id(&self, base: &str) -> String {
        unique_id(&self.stores.borrow(), base)
    }

    // ── Registries ───────────────────────────────────────────────────

    pub(crate) fn register_object(&self, object: &TraxObject) {
        self.objects
            .borrow_mut()
            .insert(object.id().to_owned(), object.downgrade());
    }

    pub(crate) fn unregister_object(&self, object: &TraxObject) {
        let mut objects = self.objects.borrow_mut();
        if objects
            .get(object.id())
            .is_some_and(|w| Weak::ptr_eq(w, &object.downgrade()))
        {
            objects.remove(object.id());
        }
    }

    /// Drop a dead registry entry. Called from node destructors.
    pub(crate) fn forget_object(&self, id: &str) {
        if let Ok(mut objects) = self.objects.try_borrow_mut() {
            if objects.get(id).is_some_and(|w| w.strong_count() == 0) {
                objects.remove(id);
            }
        }
    }

    pub(crate) fn get_object(&self, id: &str) -> Option<TraxObject> {
        let node = self.objects.borrow().get(id).and_then(Weak::upgrade)?;
        let object = TraxObject::from_inner(node);
        object.is_live().then_some(object)
    }

    /// Live objects belonging to `store_id`.
    pub(crate) fn store_objects(&self, store_id: &str) -> Vec<TraxObject> {
        let mut objects: Vec<TraxObject> = self
            .objects
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .map(TraxObject::from_inner)
            .filter(|o| o.store_id() == store_id)
            .collect();
        objects.sort_by(|a, b| a.id().cmp(b.id()));
        objects
    }

    pub(crate) fn register_processor(&self, processor: &Processor) {
        self.processors
            .borrow_mut()
            .insert(processor.id().to_owned(), processor.downgrade());
    }

    pub(crate) fn unregister_processor(&self, processor: &Processor) {
        let mut processors = self.processors.borrow_mut();
        if processors
            .get(processor.id())
            .is_some_and(|w| Weak::ptr_eq(w, &processor.downgrade()))
        {
            processors.remove(processor.id());
        }
    }

    pub(crate) fn forget_processor(&self, id: &str) {
        if let Ok(mut processors) = self.processors.try_borrow_mut() {
            if processors.get(id).is_some_and(|w| w.strong_count() == 0) {
                processors.remove(id);
            }
        }
    }

    pub(crate) fn get_processor(&self, id: &str) -> Option<Processor> {
        let inner = self.processors.borrow().get(id).and_then(Weak::upgrade)?;
        let processor = Processor::from_inner(inner);
        (!processor.is_disposed()).then_some(processor)
    }

    pub(crate) fn next_priority(&self) -> u64 {
        let n = self.processor_count.get();
        self.processor_count.set(n + 1);
        n
    }

    pub(crate) fn register_store(&self, id: &str, store: &Rc<StoreInner>) {
        self.stores
            .borrow_mut()
            .insert(id.to_owned(), Rc::downgrade(store));
    }

    pub(crate) fn unregister_store(&self, id: &str) {
        self.stores.borrow_mut().remove(id);
    }

    pub(crate) fn get_store_inner(&self, id: &str) -> Option<Rc<StoreInner>> {
        self.stores.borrow().get(id).and_then(Weak::upgrade)
    }

    // ── Call stack ───────────────────────────────────────────────────

    pub(crate) fn active_processor(&self) -> Option<Processor> {
        self.call_stack.borrow().peek().cloned()
    }

    pub(crate) fn push_processor(&self, processor: Processor) {
        self.call_stack.borrow_mut().push(processor);
    }

    pub(crate) fn pop_processor(&self, processor: &Processor) {
        self.call_stack.borrow_mut().remove_first(|p| p == processor);
    }

    // ── Reconciliation ───────────────────────────────────────────────

    pub(crate) fn enqueue(&self, processor: Processor) {
        let mut queue = self.queue.borrow_mut();
        if queue.contains(|p| *p == processor) {
            return;
        }
        queue.insert(processor, |new, existing| {
            (!new.is_renderer() && existing.is_renderer())
                || (new.is_renderer() == existing.is_renderer()
                    && new.priority() <= existing.priority())
        });
    }

    pub(crate) fn dequeue(&self, processor: &Processor) {
        self.queue.borrow_mut().remove_first(|p| p == processor);
    }

    pub(crate) fn pending_changes(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    pub(crate) fn process_changes(&self) {
        let count = self.queue.borrow().len();
        if count == 0 {
            return;
        }
        let index = self.reconciliation_count.get() + 1;
        self.reconciliation_count.set(index);
        tracing::debug!(target: "trax", index, processors = count, "reconciliation");
        let data = json!({ "name": "!Reconciliation", "index": index, "processorCount": count });
        run_sync(&self.log, data, || {
            loop {
                let next = self.queue.borrow_mut().shift();
                let Some(processor) = next else {
                    break;
                };
                processor.compute_with(
                    false,
                    crate::processor::ComputeTrigger::Reconciliation,
                    Some(index),
                );
            }
        });
    }

    // ── Executor ─────────────────────────────────────────────────────

    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        if let Err(err) = self.spawner.spawn_local(task) {
            tracing::warn!(target: "trax", error = %err, "task dropped: executor shut down");
        }
    }

    /// Close the current cycle after the executor had one more turn.
    fn schedule_flush(&self) {
        let cycle = self.log.current_cycle();
        let weak = self.weak_self.clone();
        self.spawn(async move {
            defer(()).await;
            if let Some(rt) = weak.upgrade() {
                if rt.log.cycle_open() && rt.log.current_cycle() == cycle {
                    rt.log.flush_cycle();
                }
            }
        });
    }
}

fn unique_id<T>(map: &AHashMap<String, Weak<T>>, base: &str) -> String {
    let taken = |id: &str| map.get(id).is_some_and(|w| w.strong_count() > 0);
    if !taken(base) {
        return base.to_owned();
    }
    (1u64..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_owned())
}

/// Handle on a reactive runtime.
///
/// ```
/// use serde_json::json;
/// use trax_core::Trax;
///
/// let trax = Trax::default();
/// let store = trax.create_store_from("Counter", json!({"count": 1, "double": 0}));
/// let root = store.root().unwrap();
/// let r = root.clone();
/// store.compute("Double", move |_| {
///     let count = r.get("count").as_f64().unwrap_or_default();
///     r.set("double", count * 2.0);
///     Ok(())
/// });
/// assert_eq!(root.get("double").as_f64(), Some(2.0));
///
/// root.set("count", 21);
/// trax.block_on(trax.reconciliation()).unwrap();
/// assert_eq!(root.get("double").as_f64(), Some(42.0));
/// ```
#[derive(Clone)]
pub struct Trax {
    rt: Rc<Runtime>,
}

impl Default for Trax {
    fn default() -> Self {
        Self::new(TraxConfig::default())
    }
}

impl fmt::Debug for Trax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trax")
            .field("objects", &self.rt.objects.borrow().len())
            .field("processors", &self.rt.processors.borrow().len())
            .field("stores", &self.rt.stores.borrow().len())
            .field("pending_changes", &self.rt.pending_changes())
            .finish()
    }
}

impl Trax {
    #[must_use]
    pub fn new(config: TraxConfig) -> Self {
        Self {
            rt: Runtime::new(config),
        }
    }

    pub(crate) fn from_runtime(rt: Rc<Runtime>) -> Self {
        Self { rt }
    }

    #[must_use]
    pub fn config(&self) -> &TraxConfig {
        &self.rt.config
    }

    /// The event log.
    #[must_use]
    pub fn log(&self) -> &EventStream {
        &self.rt.log
    }

    // ── Stores ───────────────────────────────────────────────────────

    /// Create a store. `init` must set the root (see [`Store::init`]) and
    /// returns the store API.
    pub fn create_store<A: 'static>(&self, id: &str, init: impl FnOnce(&Store) -> A) -> Store<A> {
        Store::create(&self.rt, None, id, init)
    }

    /// Create a store whose root holds `root`.
    pub fn create_store_from(&self, id: &str, root: serde_json::Value) -> Store {
        self.create_store(id, move |store| {
            store.init(root);
        })
    }

    #[must_use]
    pub fn get_store(&self, id: &str) -> Option<Store> {
        self.rt.get_store_inner(id).and_then(Store::from_inner)
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn is_trax_object(&self, item: &impl TraxHandle) -> bool {
        matches!(
            item.trax_type(),
            TraxObjectType::Object | TraxObjectType::Array | TraxObjectType::Dictionary
        )
    }

    pub fn get_trax_id(&self, item: &impl TraxHandle) -> Option<String> {
        item.trax_id()
    }

    pub fn get_trax_object_type(&self, item: &impl TraxHandle) -> TraxObjectType {
        item.trax_type()
    }

    #[must_use]
    pub fn get_data(&self, id: &str) -> Option<TraxObject> {
        self.rt.get_object(id)
    }

    #[must_use]
    pub fn get_processor(&self, id: &str) -> Option<Processor> {
        self.rt.get_processor(id)
    }

    /// Processor whose body is currently running.
    #[must_use]
    pub fn get_active_processor(&self) -> Option<Processor> {
        self.rt.active_processor()
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Whether dirty processors are queued.
    #[must_use]
    pub fn pending_changes(&self) -> bool {
        self.rt.pending_changes()
    }

    /// Compute every queued processor now.
    pub fn process_changes(&self) {
        self.rt.process_changes();
    }

    /// Resolves once the current cycle completed (immediately if none is
    /// open).
    pub fn reconciliation(&self) -> impl Future<Output = ()> + 'static {
        let wait = self
            .rt
            .log
            .cycle_open()
            .then(|| self.rt.log.await_event(TraxEvent::CycleComplete, None));
        async move {
            if let Some(wait) = wait {
                wait.await;
            }
        }
    }

    // ── Collections ──────────────────────────────────────────────────

    /// Rewrite `array` in place so it holds `values`.
    pub fn update_array<V: Into<Value>>(&self, array: &TraxObject, values: impl IntoIterator<Item = V>) {
        if array.kind() != ObjectKind::Array {
            self.rt
                .log
                .warn(format!("update_array: {} is not an array", array.id()));
            return;
        }
        array.update_list(values.into_iter().map(Into::into).collect());
    }

    /// Replace the entries of `dict` in place.
    pub fn update_dictionary<K: Into<String>, V: Into<Value>>(
        &self,
        dict: &TraxObject,
        entries: impl IntoIterator<Item = (K, V)>,
    ) {
        if dict.kind() == ObjectKind::Array {
            self.rt
                .log
                .warn(format!("update_dictionary: {} is an array", dict.id()));
            return;
        }
        dict.update_map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
    }

    /// Keys of `object`, tracked on its size.
    pub fn get_object_keys(&self, object: &TraxObject) -> Vec<String> {
        object.keys()
    }

    // ── Executor ─────────────────────────────────────────────────────

    /// Run the executor until `future` resolves.
    ///
    /// Fails when called from a task the executor is running.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, TraxError> {
        let Ok(mut pool) = self.rt.pool.try_borrow_mut() else {
            return Err(self.busy("block_on"));
        };
        Ok(pool.run_until(future))
    }

    /// Run every task that can make progress.
    pub fn run_until_stalled(&self) -> Result<(), TraxError> {
        let Ok(mut pool) = self.rt.pool.try_borrow_mut() else {
            return Err(self.busy("run_until_stalled"));
        };
        pool.run_until_stalled();
        Ok(())
    }

    fn busy(&self, operation: &'static str) -> TraxError {
        let err = TraxError::ExecutorBusy { operation };
        self.rt.report(err.clone());
        err
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
