#![forbid(unsafe_code)]

//! Compute units with automatic dependency tracking.
//!
//! A [`Processor`] runs a body that reads and writes trax objects. Every read
//! made during a run is recorded as an `(object id, field)` dependency; a
//! later write to one of those fields marks the processor dirty and queues it
//! for the next reconciliation pass.
//!
//! # State machine
//!
//! ```text
//!   Dirty ──compute──▶ Computing ──▶ Clean ──write to a dependency──▶ Dirty
//!     any state ──dispose──▶ Disposed (terminal)
//! ```
//!
//! # Async runs
//!
//! An async body returns a future. The synchronous prefix of the future runs
//! inside `compute`; the rest runs on the runtime executor. Each run carries
//! a token: starting a new run or disposing the processor bumps it, and a
//! suspended run whose token is stale is woken and dropped without further
//! effect.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::task::Waker;

use ahash::{AHashMap, AHashSet};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::json;

use crate::error::{ComputeResult, TraxError};
use crate::object::{NodeInner, TraxObject};
use crate::runtime::Runtime;
use crate::store::StoreInner;
use crate::stream::TraxEvent;
use crate::wrapper::{StepHooks, Tracked, run_sync};

/// Why a processor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeTrigger {
    /// First run, at creation.
    Init,
    /// Reconciliation pass.
    Reconciliation,
    /// Explicit [`Processor::compute`] call.
    DirectCall,
    /// Lazy processor pulled by a read of its target.
    TargetRead,
}

impl ComputeTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Reconciliation => "Reconciliation",
            Self::DirectCall => "DirectCall",
            Self::TargetRead => "TargetRead",
        }
    }
}

impl fmt::Display for ComputeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type SyncBody = Box<dyn Fn(&ComputeContext) -> ComputeResult>;
type AsyncBody = Box<dyn Fn(ComputeContext) -> LocalBoxFuture<'static, ComputeResult>>;

/// Processor body.
pub enum ComputeFn {
    Sync(SyncBody),
    Async(AsyncBody),
}

impl ComputeFn {
    pub fn sync(f: impl Fn(&ComputeContext) -> ComputeResult + 'static) -> Self {
        Self::Sync(Box::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(ComputeContext) -> Fut + 'static,
        Fut: Future<Output = ComputeResult> + 'static,
    {
        Self::Async(Box::new(move |cx| f(cx).boxed_local()))
    }
}

impl fmt::Debug for ComputeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("ComputeFn::Sync"),
            Self::Async(_) => f.write_str("ComputeFn::Async"),
        }
    }
}

/// Creation options for [`Store::compute_with`](crate::Store::compute_with).
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Re-run during reconciliation. Lazy processors only run when pulled.
    pub auto_compute: bool,
    /// Scheduled after every non-renderer processor.
    pub is_renderer: bool,
    /// Dispose after this many computations.
    pub max_compute_count: Option<u64>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            auto_compute: true,
            is_renderer: false,
            max_compute_count: None,
        }
    }
}

impl ProcessorOptions {
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.auto_compute = false;
        self
    }

    #[must_use]
    pub fn renderer(mut self) -> Self {
        self.is_renderer = true;
        self
    }

    #[must_use]
    pub fn with_max_compute_count(mut self, count: u64) -> Self {
        self.max_compute_count = Some(count);
        self
    }
}

type DirtyCallback = Rc<dyn Fn(&Processor) -> ComputeResult>;

pub(crate) struct ProcessorInner {
    id: String,
    name: String,
    store_id: String,
    priority: u64,
    auto_compute: bool,
    is_renderer: bool,
    rt: Weak<Runtime>,
    store: Weak<StoreInner>,
    target: Option<Weak<NodeInner>>,
    compute_count: Cell<u64>,
    max_compute_count: Cell<Option<u64>>,
    dirty: Cell<bool>,
    disposed: Cell<bool>,
    run_token: Cell<u64>,
    /// Wakes the suspended run, if any.
    run_waker: RefCell<Option<Waker>>,
    last_reconciliation: Cell<Option<u64>>,
    /// object id -> fields read
    dependencies: RefCell<AHashMap<String, AHashSet<String>>>,
    read_objects: RefCell<AHashMap<String, Weak<NodeInner>>>,
    subscribed: RefCell<AHashMap<String, Weak<NodeInner>>>,
    owned_props: RefCell<Vec<(Weak<NodeInner>, String)>>,
    owned_content: RefCell<Vec<Weak<NodeInner>>>,
    compute_fn: RefCell<Option<ComputeFn>>,
    on_dirty: RefCell<Option<DirtyCallback>>,
}

impl Drop for ProcessorInner {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.forget_processor(&self.id);
        }
    }
}

/// Parameters of a processor registration.
pub(crate) struct ProcessorDef {
    pub id: String,
    pub name: String,
    pub store_id: String,
    pub priority: u64,
    pub options: ProcessorOptions,
    pub target: Option<Weak<NodeInner>>,
}

/// Handle on a processor. Clones share the processor.
#[derive(Clone)]
pub struct Processor {
    inner: Rc<ProcessorInner>,
}

impl PartialEq for Processor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.inner.id)
            .field("priority", &self.inner.priority)
            .field("dirty", &self.inner.dirty.get())
            .field("disposed", &self.inner.disposed.get())
            .field("compute_count", &self.inner.compute_count.get())
            .finish()
    }
}

impl Processor {
    pub(crate) fn new(
        rt: &Rc<Runtime>,
        store: Weak<StoreInner>,
        def: ProcessorDef,
        body: ComputeFn,
    ) -> Self {
        Self {
            inner: Rc::new(ProcessorInner {
                id: def.id,
                name: def.name,
                store_id: def.store_id,
                priority: def.priority,
                auto_compute: def.options.auto_compute,
                is_renderer: def.options.is_renderer,
                rt: Rc::downgrade(rt),
                store,
                target: def.target,
                compute_count: Cell::new(0),
                max_compute_count: Cell::new(def.options.max_compute_count),
                dirty: Cell::new(true),
                disposed: Cell::new(false),
                run_token: Cell::new(0),
                run_waker: RefCell::new(None),
                last_reconciliation: Cell::new(None),
                dependencies: RefCell::new(AHashMap::new()),
                read_objects: RefCell::new(AHashMap::new()),
                subscribed: RefCell::new(AHashMap::new()),
                owned_props: RefCell::new(Vec::new()),
                owned_content: RefCell::new(Vec::new()),
                compute_fn: RefCell::new(Some(body)),
                on_dirty: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ProcessorInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ProcessorInner> {
        Rc::downgrade(&self.inner)
    }

    /// Mark disposed without side effects (never registered).
    pub(crate) fn into_inert(self) -> Self {
        self.inner.disposed.set(true);
        self.inner.dirty.set(false);
        drop(self.inner.compute_fn.borrow_mut().take());
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// `store%name`, or `store%data[name]` for lazy content processors.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn store_id(&self) -> &str {
        &self.inner.store_id
    }

    /// Creation order; lower runs first.
    #[must_use]
    pub fn priority(&self) -> u64 {
        self.inner.priority
    }

    #[must_use]
    pub fn compute_count(&self) -> u64 {
        self.inner.compute_count.get()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    #[must_use]
    pub fn auto_compute(&self) -> bool {
        self.inner.auto_compute
    }

    #[must_use]
    pub fn is_renderer(&self) -> bool {
        self.inner.is_renderer
    }

    /// Object a lazy content processor is attached to.
    #[must_use]
    pub fn target(&self) -> Option<TraxObject> {
        self.inner
            .target
            .as_ref()
            .and_then(Weak::upgrade)
            .map(TraxObject::from_inner)
    }

    /// Sorted `(object id, field)` pairs read by the last run.
    #[must_use]
    pub fn dependencies(&self) -> Vec<(String, String)> {
        let mut deps: Vec<(String, String)> = self
            .inner
            .dependencies
            .borrow()
            .iter()
            .flat_map(|(obj, props)| props.iter().map(move |p| (obj.clone(), p.clone())))
            .collect();
        deps.sort();
        deps
    }

    #[must_use]
    pub fn has_dependency(&self, object_id: &str, prop: &str) -> bool {
        self.inner
            .dependencies
            .borrow()
            .get(object_id)
            .is_some_and(|props| props.contains(prop))
    }

    pub fn max_compute_count(&self) -> Option<u64> {
        self.inner.max_compute_count.get()
    }

    pub fn set_max_compute_count(&self, count: Option<u64>) {
        self.inner.max_compute_count.set(count);
    }

    /// Callback invoked when the processor turns dirty.
    pub fn set_on_dirty(&self, callback: impl Fn(&Processor) -> ComputeResult + 'static) {
        *self.inner.on_dirty.borrow_mut() = Some(Rc::new(callback));
    }

    // ── Compute ──────────────────────────────────────────────────────

    /// Run the body now if dirty, or unconditionally with `force`.
    pub fn compute(&self, force: bool) {
        self.compute_with(force, ComputeTrigger::DirectCall, None);
    }

    pub(crate) fn compute_on_read(&self) {
        self.compute_with(false, ComputeTrigger::TargetRead, None);
    }

    pub(crate) fn compute_with(
        &self,
        force: bool,
        trigger: ComputeTrigger,
        reconciliation: Option<u64>,
    ) {
        let p = &*self.inner;
        if p.disposed.get() || (!p.dirty.get() && !force) {
            return;
        }
        if !p.auto_compute
            && matches!(trigger, ComputeTrigger::Init | ComputeTrigger::Reconciliation)
        {
            return;
        }
        let Some(rt) = p.rt.upgrade() else {
            return;
        };
        if let Some(index) = reconciliation {
            if p.last_reconciliation.get() == Some(index) {
                rt.report(TraxError::CircularReference {
                    processor_id: p.id.clone(),
                });
                return;
            }
            p.last_reconciliation.set(Some(index));
        }
        let Some(body) = p.compute_fn.borrow_mut().take() else {
            // Body already running further up the stack.
            rt.report(TraxError::CircularReference {
                processor_id: p.id.clone(),
            });
            return;
        };

        let count = p.compute_count.get() + 1;
        p.compute_count.set(count);
        p.dirty.set(false);
        if reconciliation.is_none() {
            rt.dequeue(self);
        }
        let token = self.cancel_run();
        p.dependencies.borrow_mut().clear();
        p.read_objects.borrow_mut().clear();

        tracing::debug!(
            target: "trax",
            processor_id = %p.id,
            trigger = trigger.as_str(),
            compute_count = count,
            "compute"
        );

        let data = json!({
            "name": "!Compute",
            "processorId": p.id,
            "processorPriority": p.priority,
            "trigger": trigger.as_str(),
            "isRenderer": p.is_renderer,
            "computeCount": count,
        });
        let cx = ComputeContext {
            processor: self.clone(),
            trigger,
            compute_count: count,
        };
        let hooks = RunHooks {
            processor: self.clone(),
            token,
        };

        match &body {
            ComputeFn::Sync(f) => run_sync(&rt.log, data, || {
                hooks.step_start();
                let result = f(&cx);
                hooks.step_end();
                hooks.complete(&result);
            }),
            ComputeFn::Async(f) => {
                let tracked = Tracked::new(rt.log.clone(), data, f(cx), hooks);
                if let Err(pending) = tracked.poll_first() {
                    rt.spawn(pending.map(drop));
                }
            }
        }

        if !p.disposed.get() {
            *p.compute_fn.borrow_mut() = Some(body);
        }
    }

    /// Invalidate the in-flight run and wake it so its task ends on the
    /// next executor turn. Returns the new token.
    fn cancel_run(&self) -> u64 {
        let p = &*self.inner;
        let token = p.run_token.get() + 1;
        p.run_token.set(token);
        let waker = p.run_waker.borrow_mut().take();
        if let Some(waker) = waker {
            waker.wake();
        }
        token
    }

    fn complete(&self, result: &ComputeResult) {
        let p = &*self.inner;
        let Some(rt) = p.rt.upgrade() else {
            return;
        };
        match result {
            Err(err) => rt.report(TraxError::Compute {
                processor_id: p.id.clone(),
                reason: err.to_string(),
            }),
            Ok(()) => {
                if p
                    .max_compute_count
                    .get()
                    .is_some_and(|max| p.compute_count.get() >= max)
                {
                    self.dispose();
                } else if p.auto_compute && p.dependencies.borrow().is_empty() {
                    rt.report(TraxError::NoDependencies {
                        processor_id: p.id.clone(),
                    });
                }
            }
        }
    }

    // ── Tracking ─────────────────────────────────────────────────────

    pub(crate) fn add_dependency(&self, object: &TraxObject, prop: &str) {
        let id = object.id();
        let mut deps = self.inner.dependencies.borrow_mut();
        match deps.get_mut(id) {
            Some(props) => {
                props.insert(prop.to_owned());
            }
            None => {
                deps.insert(id.to_owned(), AHashSet::from_iter([prop.to_owned()]));
                self.inner
                    .read_objects
                    .borrow_mut()
                    .insert(id.to_owned(), object.downgrade());
            }
        }
    }

    pub(crate) fn own_prop(&self, object: &TraxObject, prop: &str) {
        self.inner
            .owned_props
            .borrow_mut()
            .push((object.downgrade(), prop.to_owned()));
    }

    pub(crate) fn own_content(&self, object: &TraxObject) {
        self.inner.owned_content.borrow_mut().push(object.downgrade());
    }

    /// Subscribe to objects read since the run started; drop the others.
    fn sync_subscriptions(&self) {
        if self.inner.disposed.get() {
            return;
        }
        let read = self.inner.read_objects.borrow().clone();
        let (stale, fresh) = {
            let mut subscribed = self.inner.subscribed.borrow_mut();
            let stale: Vec<Weak<NodeInner>> = subscribed
                .iter()
                .filter(|(id, _)| !read.contains_key(*id))
                .map(|(_, w)| w.clone())
                .collect();
            let fresh: Vec<Weak<NodeInner>> = read
                .iter()
                .filter(|(id, _)| !subscribed.contains_key(*id))
                .map(|(_, w)| w.clone())
                .collect();
            *subscribed = read;
            (stale, fresh)
        };
        for node in stale.iter().filter_map(Weak::upgrade) {
            TraxObject::from_inner(node).remove_listener(&self.inner.id);
        }
        for node in fresh.iter().filter_map(Weak::upgrade) {
            TraxObject::from_inner(node).add_listener(self);
        }
    }

    /// React to a write on `(object_id, prop)`.
    ///
    /// Writes made by the processor's own running step are ignored. A
    /// processor that is already dirty but no longer queued (it was skipped
    /// as circular) is queued again.
    pub(crate) fn notify_change(&self, object_id: &str, prop: &str) {
        let p = &*self.inner;
        if p.disposed.get() || !self.has_dependency(object_id, prop) {
            return;
        }
        let Some(rt) = p.rt.upgrade() else {
            return;
        };
        if rt.active_processor().as_ref() == Some(self) {
            return;
        }
        if p.dirty.replace(true) {
            if p.auto_compute {
                rt.enqueue(self.clone());
            }
            return;
        }
        rt.emit(
            TraxEvent::ProcessorDirty,
            json!({ "processorId": p.id, "objectId": object_id, "propName": prop }),
        );
        let callback = p.on_dirty.borrow().clone();
        if let Some(callback) = callback {
            if let Err(err) = callback(self) {
                rt.report(TraxError::OnDirty {
                    processor_id: p.id.clone(),
                    reason: err.to_string(),
                });
            }
        }
        if p.auto_compute {
            rt.enqueue(self.clone());
        }
    }

    // ── Disposal ─────────────────────────────────────────────────────

    /// Stop tracking, release owned fields, cancel in-flight runs and log
    /// `!DEL`. Returns `false` if already disposed.
    pub fn dispose(&self) -> bool {
        let p = &*self.inner;
        if p.disposed.replace(true) {
            return false;
        }
        self.cancel_run();

        let subscribed = std::mem::take(&mut *p.subscribed.borrow_mut());
        for node in subscribed.values().filter_map(Weak::upgrade) {
            TraxObject::from_inner(node).remove_listener(&p.id);
        }
        p.dependencies.borrow_mut().clear();
        p.read_objects.borrow_mut().clear();

        let owned = std::mem::take(&mut *p.owned_props.borrow_mut());
        for (node, prop) in owned {
            if let Some(node) = node.upgrade() {
                TraxObject::from_inner(node).release_prop(&prop, &p.id);
            }
        }
        let owned = std::mem::take(&mut *p.owned_content.borrow_mut());
        for node in owned.iter().filter_map(Weak::upgrade) {
            TraxObject::from_inner(node).release_content(&p.id);
        }

        let body = p.compute_fn.borrow_mut().take();
        drop(body);
        let callback = p.on_dirty.borrow_mut().take();
        drop(callback);

        if let Some(store) = p.store.upgrade() {
            store.forget_processor(&p.name);
        }
        if let Some(rt) = p.rt.upgrade() {
            rt.dequeue(self);
            rt.unregister_processor(self);
            rt.emit(TraxEvent::Dispose, json!({ "objectId": p.id }));
        }
        tracing::debug!(target: "trax", processor_id = %p.id, "processor disposed");
        true
    }
}

/// Per-run view handed to processor bodies.
#[derive(Clone)]
pub struct ComputeContext {
    processor: Processor,
    trigger: ComputeTrigger,
    compute_count: u64,
}

impl fmt::Debug for ComputeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeContext")
            .field("processor_id", &self.processor.id())
            .field("trigger", &self.trigger)
            .field("compute_count", &self.compute_count)
            .finish()
    }
}

impl ComputeContext {
    #[must_use]
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    #[must_use]
    pub fn processor_id(&self) -> &str {
        self.processor.id()
    }

    #[must_use]
    pub fn processor_name(&self) -> &str {
        self.processor.name()
    }

    /// Count including the current run.
    #[must_use]
    pub fn compute_count(&self) -> u64 {
        self.compute_count
    }

    #[must_use]
    pub fn trigger(&self) -> ComputeTrigger {
        self.trigger
    }

    pub fn set_max_compute_count(&self, count: u64) {
        self.processor.set_max_compute_count(Some(count));
    }
}

struct RunHooks {
    processor: Processor,
    token: u64,
}

impl StepHooks<ComputeResult> for RunHooks {
    fn step_start(&self) {
        if let Some(rt) = self.processor.inner.rt.upgrade() {
            rt.push_processor(self.processor.clone());
        }
    }

    fn step_end(&self) {
        if let Some(rt) = self.processor.inner.rt.upgrade() {
            rt.pop_processor(&self.processor);
        }
        self.processor.sync_subscriptions();
    }

    fn is_current(&self) -> bool {
        let p = &self.processor.inner;
        !p.disposed.get() && p.run_token.get() == self.token
    }

    fn complete(&self, result: &ComputeResult) {
        self.processor.inner.run_waker.borrow_mut().take();
        self.processor.complete(result);
    }

    fn suspended(&self, waker: &Waker) {
        if self.is_current() {
            *self.processor.inner.run_waker.borrow_mut() = Some(waker.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
