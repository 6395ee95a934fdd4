#![forbid(unsafe_code)]

//! Causal event log.
//!
//! Every lifecycle step of the runtime (object creation and disposal,
//! property reads and writes, processor dirtying and computation) is appended
//! to an [`EventStream`] as a [`StreamEvent`]. Events are grouped into
//! *cycles* (one per cooperative scheduling turn) and nested inside
//! *processing contexts* (spans opened with
//! [`start_processing_context`](EventStream::start_processing_context)).
//!
//! # Ids
//!
//! Event ids read `"<cycle>:<sequence>"`. A cycle opens lazily with a `!CS`
//! event on the first event logged after the previous `!CC`, and closes with
//! [`flush_cycle`](EventStream::flush_cycle), which the runtime schedules once
//! per turn on its executor.
//!
//! # Invariants
//!
//! 1. Within a cycle, sequence numbers strictly increase.
//! 2. `size() <= max_size()` whenever `max_size() >= 0`; evicted entries are
//!    recycled for the newest event.
//! 3. Event types starting with `!` can only be logged by the runtime, except
//!    `!LOG`, `!WRN` and `!ERR`.
//! 4. Callbacks and awaiters run after the event is in the buffer, with no
//!    internal borrow held: they may log further events.

mod context;
mod matcher;

pub use context::{ContextState, ProcessingContext};
pub use matcher::{EventMatch, FieldMatch};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use ahash::AHashMap;
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use web_time::Instant;

use crate::error::TraxError;
use crate::linked_list::LinkedList;

/// Default maximum number of events kept in the buffer.
pub const DEFAULT_MAX_SIZE: i64 = 1000;

/// Built-in event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraxEvent {
    CycleStart,
    CycleComplete,
    Info,
    Warning,
    Error,
    ProcessingStart,
    ProcessingPause,
    ProcessingResume,
    ProcessingEnd,
    New,
    Dispose,
    Set,
    Get,
    ProcessorDirty,
}

impl TraxEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CycleStart => "!CS",
            Self::CycleComplete => "!CC",
            Self::Info => "!LOG",
            Self::Warning => "!WRN",
            Self::Error => "!ERR",
            Self::ProcessingStart => "!PCS",
            Self::ProcessingPause => "!PCP",
            Self::ProcessingResume => "!PCR",
            Self::ProcessingEnd => "!PCE",
            Self::New => "!NEW",
            Self::Dispose => "!DEL",
            Self::Set => "!SET",
            Self::Get => "!GET",
            Self::ProcessorDirty => "!DRT",
        }
    }

    /// Types any caller may log without a [`LogKey`].
    fn is_public(kind: &str) -> bool {
        matches!(kind, "!LOG" | "!WRN" | "!ERR")
    }
}

impl AsRef<str> for TraxEvent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TraxEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix reserved for runtime event types.
pub const RESERVED_PREFIX: char = '!';

/// Type name matching every event in [`EventStream::subscribe`].
pub const ANY_EVENT: &str = "*";

/// Authorization token for logging reserved event types.
///
/// Only the runtime can build one.
#[derive(Debug)]
pub struct LogKey {
    _private: (),
}

pub(crate) const INTERNAL_KEY: LogKey = LogKey { _private: () };

/// One entry of the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// `"<cycle>:<sequence>"`.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
    /// Id of the enclosing processing context.
    #[serde(rename = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl StreamEvent {
    /// String payload (info, warning and error events).
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.data.as_ref().and_then(Json::as_str)
    }

    /// Field of an object payload.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Json> {
        self.data.as_ref().and_then(|d| d.get(name))
    }
}

/// Configuration for a standalone [`EventStream`].
#[derive(Debug, Clone)]
pub struct EventStreamConfig {
    /// Maximum number of buffered events (`>= 2`, negative = unbounded).
    pub max_size: i64,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl EventStreamConfig {
    #[must_use]
    pub fn with_max_size(mut self, max_size: i64) -> Self {
        self.max_size = max_size;
        self
    }
}

/// Identifier returned by [`EventStream::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Rc<dyn Fn(&StreamEvent)>;
type Hook = Rc<dyn Fn()>;

struct Subscriber {
    id: SubscriptionId,
    kind: String,
    callback: Callback,
}

struct Awaiter {
    kind: String,
    matcher: Option<EventMatch>,
    tx: oneshot::Sender<StreamEvent>,
}

impl Awaiter {
    fn accepts(&self, event: &StreamEvent) -> bool {
        (self.kind == ANY_EVENT || self.kind == event.kind)
            && self
                .matcher
                .as_ref()
                .is_none_or(|m| m.matches(event.data.as_ref()))
    }
}

/// Runtime callbacks around cycle boundaries.
#[derive(Default, Clone)]
pub(crate) struct StreamHooks {
    /// Called right after a cycle opened.
    pub on_cycle_start: Option<Hook>,
    /// Called at flush time, before unclosed contexts are checked and `!CC`
    /// is logged.
    pub before_cycle_complete: Option<Hook>,
}

struct StreamState {
    buffer: VecDeque<StreamEvent>,
    max_size: i64,
    cycle: u64,
    seq: u64,
    cycle_open: bool,
    any_cycle: bool,
    epoch: Instant,
    cycle_started_at: Instant,
}

struct ContextEntry {
    state: ContextState,
    data: Json,
}

#[derive(Default)]
struct ContextStack {
    stack: LinkedList<String>,
    entries: AHashMap<String, ContextEntry>,
}

struct StreamInner {
    state: RefCell<StreamState>,
    contexts: RefCell<ContextStack>,
    subscribers: RefCell<Vec<Subscriber>>,
    awaiters: RefCell<Vec<Awaiter>>,
    hooks: RefCell<StreamHooks>,
    next_subscription: Cell<u64>,
}

/// Which parent to attach to an appended event.
enum Parent {
    /// Current top of the context stack.
    Current,
    Explicit(Option<String>),
}

/// Append-only causal log. Cloning yields a new handle to the same log.
#[derive(Clone)]
pub struct EventStream {
    inner: Rc<StreamInner>,
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.borrow();
        f.debug_struct("EventStream")
            .field("size", &st.buffer.len())
            .field("max_size", &st.max_size)
            .field("cycle", &st.cycle)
            .field("cycle_open", &st.cycle_open)
            .finish()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(EventStreamConfig::default())
    }
}

impl EventStream {
    #[must_use]
    pub fn new(config: EventStreamConfig) -> Self {
        let now = Instant::now();
        Self {
            inner: Rc::new(StreamInner {
                state: RefCell::new(StreamState {
                    buffer: VecDeque::new(),
                    max_size: clamp_max_size(config.max_size),
                    cycle: 0,
                    seq: 0,
                    cycle_open: false,
                    any_cycle: false,
                    epoch: now,
                    cycle_started_at: now,
                }),
                contexts: RefCell::new(ContextStack::default()),
                subscribers: RefCell::new(Vec::new()),
                awaiters: RefCell::new(Vec::new()),
                hooks: RefCell::new(StreamHooks::default()),
                next_subscription: Cell::new(1),
            }),
        }
    }

    pub(crate) fn set_hooks(&self, hooks: StreamHooks) {
        *self.inner.hooks.borrow_mut() = hooks;
    }

    // ── Buffer ───────────────────────────────────────────────────────

    #[must_use]
    pub fn max_size(&self) -> i64 {
        self.inner.state.borrow().max_size
    }

    /// Change the buffer bound, evicting the oldest events if needed.
    pub fn set_max_size(&self, max_size: i64) {
        let mut st = self.inner.state.borrow_mut();
        st.max_size = clamp_max_size(max_size);
        if st.max_size >= 0 {
            let max = st.max_size as usize;
            while st.buffer.len() > max {
                st.buffer.pop_front();
            }
        }
    }

    /// Number of buffered events.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.state.borrow().buffer.len()
    }

    /// Whether events were logged since the last `!CC`.
    #[must_use]
    pub fn cycle_open(&self) -> bool {
        self.inner.state.borrow().cycle_open
    }

    /// Number of the current (or last) cycle.
    pub(crate) fn current_cycle(&self) -> u64 {
        self.inner.state.borrow().cycle
    }

    /// Visit buffered events oldest first; return `false` to stop.
    pub fn scan(&self, mut visitor: impl FnMut(&StreamEvent) -> bool) {
        // Snapshot so the visitor may log.
        let events: Vec<StreamEvent> = self.inner.state.borrow().buffer.iter().cloned().collect();
        for event in &events {
            if !visitor(event) {
                break;
            }
        }
    }

    #[must_use]
    pub fn last_event(&self) -> Option<StreamEvent> {
        self.inner.state.borrow().buffer.back().cloned()
    }

    // ── Logging ──────────────────────────────────────────────────────

    /// Log an application event. Reserved types are rejected.
    pub fn event(&self, kind: &str, data: impl Serialize) {
        self.event_with_key(kind, data, None);
    }

    /// Log an event, authorizing reserved types when `key` is provided.
    pub fn event_with_key(&self, kind: &str, data: impl Serialize, key: Option<&LogKey>) {
        if kind.starts_with(RESERVED_PREFIX) && key.is_none() && !TraxEvent::is_public(kind) {
            self.report(TraxError::ReservedEventType {
                kind: kind.to_owned(),
            });
            return;
        }
        match serde_json::to_value(&data) {
            Ok(Json::Null) => {
                self.emit(kind, None);
            }
            Ok(value) => {
                self.emit(kind, Some(value));
            }
            Err(err) => self.report(TraxError::InvalidEventData {
                kind: kind.to_owned(),
                reason: err.to_string(),
            }),
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        let message = message.to_string();
        tracing::info!(target: "trax", "{message}");
        self.emit(TraxEvent::Info.as_str(), Some(Json::String(message)));
    }

    pub fn warn(&self, message: impl fmt::Display) {
        let message = message.to_string();
        tracing::warn!(target: "trax", "{message}");
        self.emit(TraxEvent::Warning.as_str(), Some(Json::String(message)));
    }

    pub fn error(&self, message: impl fmt::Display) {
        let message = message.to_string();
        tracing::error!(target: "trax", "{message}");
        self.emit(TraxEvent::Error.as_str(), Some(Json::String(message)));
    }

    /// Log a runtime error.
    pub(crate) fn report(&self, err: TraxError) {
        let message = err.to_string();
        tracing::error!(target: "trax", category = err.category(), "{message}");
        self.emit(TraxEvent::Error.as_str(), Some(Json::String(message)));
    }

    /// Append an event parented to the current context. Returns its id.
    pub(crate) fn emit(&self, kind: &str, data: Option<Json>) -> String {
        self.emit_with(kind, data, Parent::Current)
    }

    fn emit_with(&self, kind: &str, data: Option<Json>, parent: Parent) -> String {
        self.open_cycle();
        let parent_id = match parent {
            Parent::Current => self.current_context_id(),
            Parent::Explicit(p) => p,
        };
        let event = self.append(kind, data, parent_id);
        self.dispatch(&event);
        event.id
    }

    fn open_cycle(&self) {
        let elapsed = {
            let mut st = self.inner.state.borrow_mut();
            if st.cycle_open {
                return;
            }
            if st.any_cycle {
                st.cycle += 1;
            }
            st.any_cycle = true;
            st.cycle_open = true;
            st.seq = 0;
            st.cycle_started_at = Instant::now();
            elapsed_ms(st.epoch)
        };
        let event = self.append(
            TraxEvent::CycleStart.as_str(),
            Some(serde_json::json!({ "elapsedTime": elapsed })),
            None,
        );
        self.dispatch(&event);
        let hook = self.inner.hooks.borrow().on_cycle_start.clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn append(&self, kind: &str, data: Option<Json>, parent_id: Option<String>) -> StreamEvent {
        let mut st = self.inner.state.borrow_mut();
        let seq = st.seq;
        st.seq += 1;
        let cycle = st.cycle;
        let full = st.max_size >= 0 && st.buffer.len() as i64 >= st.max_size;
        let mut event = if full {
            st.buffer.pop_front().unwrap_or_default()
        } else {
            StreamEvent::default()
        };
        event.id.clear();
        let _ = write!(event.id, "{cycle}:{seq}");
        event.kind.clear();
        event.kind.push_str(kind);
        event.data = data;
        event.parent_id = parent_id;
        st.buffer.push_back(event.clone());
        event
    }

    fn dispatch(&self, event: &StreamEvent) {
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .filter(|s| s.kind == ANY_EVENT || s.kind == event.kind)
            .map(|s| Rc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }

        let ready: Vec<Awaiter> = {
            let mut awaiters = self.inner.awaiters.borrow_mut();
            if awaiters.is_empty() {
                return;
            }
            let all = std::mem::take(&mut *awaiters);
            let (ready, keep): (Vec<_>, Vec<_>) = all
                .into_iter()
                .filter(|a| !a.tx.is_canceled())
                .partition(|a| a.accepts(event));
            *awaiters = keep;
            ready
        };
        for awaiter in ready {
            let _ = awaiter.tx.send(event.clone());
        }
    }

    /// Close the current cycle: run the pre-completion hook, report and
    /// unwind unclosed contexts, then log `!CC`. No-op if no cycle is open.
    pub fn flush_cycle(&self) {
        if !self.cycle_open() {
            return;
        }
        let hook = self.inner.hooks.borrow().before_cycle_complete.clone();
        if let Some(hook) = hook {
            hook();
        }

        let unclosed: Vec<String> = {
            let mut ctx = self.inner.contexts.borrow_mut();
            let mut ids = Vec::new();
            while let Some(id) = ctx.stack.shift() {
                ctx.entries.remove(&id);
                ids.push(id);
            }
            ids
        };
        for context_id in unclosed {
            self.report(TraxError::UnclosedContext { context_id });
        }

        let elapsed = elapsed_ms(self.inner.state.borrow().cycle_started_at);
        let event = self.append(
            TraxEvent::CycleComplete.as_str(),
            Some(serde_json::json!({ "elapsedTime": elapsed })),
            None,
        );
        self.inner.state.borrow_mut().cycle_open = false;
        self.dispatch(&event);
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Call `callback` for every future event of type `kind` (`"*"` for all).
    pub fn subscribe(
        &self,
        kind: impl AsRef<str>,
        callback: impl Fn(&StreamEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.get());
        self.inner.next_subscription.set(id.0 + 1);
        self.inner.subscribers.borrow_mut().push(Subscriber {
            id,
            kind: kind.as_ref().to_owned(),
            callback: Rc::new(callback),
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subscribers.borrow_mut();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Resolve with the next event of type `kind` whose payload satisfies
    /// `matcher`.
    pub fn await_event(&self, kind: impl AsRef<str>, matcher: Option<EventMatch>) -> AwaitEvent {
        let (tx, rx) = oneshot::channel();
        self.inner.awaiters.borrow_mut().push(Awaiter {
            kind: kind.as_ref().to_owned(),
            matcher,
            tx,
        });
        AwaitEvent { rx }
    }

    // ── Processing contexts ──────────────────────────────────────────

    /// Open a context parented to the current top of the context stack.
    pub fn start_processing_context(&self, data: impl Serialize) -> ProcessingContext {
        let data = match serde_json::to_value(&data) {
            Ok(v) => v,
            Err(err) => {
                self.report(TraxError::InvalidEventData {
                    kind: TraxEvent::ProcessingStart.as_str().to_owned(),
                    reason: err.to_string(),
                });
                Json::Null
            }
        };
        let id = self.emit(TraxEvent::ProcessingStart.as_str(), Some(data.clone()));
        let mut ctx = self.inner.contexts.borrow_mut();
        ctx.stack.push(id.clone());
        ctx.entries.insert(
            id.clone(),
            ContextEntry {
                state: ContextState::Started,
                data,
            },
        );
        ProcessingContext::new(id, self.clone())
    }

    /// Id of the context on top of the stack.
    #[must_use]
    pub fn current_context_id(&self) -> Option<String> {
        self.inner.contexts.borrow().stack.peek().cloned()
    }

    pub(crate) fn context_state(&self, id: &str) -> ContextState {
        self.inner
            .contexts
            .borrow()
            .entries
            .get(id)
            .map_or(ContextState::Ended, |e| e.state)
    }

    pub(crate) fn pause_context(&self, id: &str) -> bool {
        let state = self.context_state(id);
        if !matches!(state, ContextState::Started | ContextState::Resumed) {
            self.report_transition(id, "pause", state);
            return false;
        }
        self.unwind_above(id);
        let data = {
            let mut ctx = self.inner.contexts.borrow_mut();
            ctx.stack.remove_first(|c| c == id);
            ctx.entries.get_mut(id).map(|e| {
                e.state = ContextState::Paused;
                e.data.clone()
            })
        };
        self.emit_with(
            TraxEvent::ProcessingPause.as_str(),
            data,
            Parent::Explicit(Some(id.to_owned())),
        );
        true
    }

    pub(crate) fn resume_context(&self, id: &str) -> bool {
        let state = self.context_state(id);
        if state != ContextState::Paused {
            self.report_transition(id, "resume", state);
            return false;
        }
        let data = {
            let mut ctx = self.inner.contexts.borrow_mut();
            ctx.stack.push(id.to_owned());
            ctx.entries.get_mut(id).map(|e| {
                e.state = ContextState::Resumed;
                e.data.clone()
            })
        };
        self.emit_with(
            TraxEvent::ProcessingResume.as_str(),
            data,
            Parent::Explicit(Some(id.to_owned())),
        );
        true
    }

    /// Forget a paused context without logging.
    pub(crate) fn discard_context(&self, id: &str) {
        let mut ctx = self.inner.contexts.borrow_mut();
        ctx.stack.remove_first(|c| c == id);
        ctx.entries.remove(id);
    }

    pub(crate) fn end_context(&self, id: &str) -> bool {
        let state = self.context_state(id);
        if state == ContextState::Ended {
            self.report_transition(id, "end", state);
            return false;
        }
        if state != ContextState::Paused {
            self.unwind_above(id);
        }
        let data = {
            let mut ctx = self.inner.contexts.borrow_mut();
            ctx.stack.remove_first(|c| c == id);
            ctx.entries.remove(id).map(|e| e.data)
        };
        self.emit_with(
            TraxEvent::ProcessingEnd.as_str(),
            data,
            Parent::Explicit(Some(id.to_owned())),
        );
        true
    }

    /// Pop and report every context stacked above `id`.
    fn unwind_above(&self, id: &str) {
        let unclosed: Vec<String> = {
            let mut ctx = self.inner.contexts.borrow_mut();
            if !ctx.stack.contains(|c| c == id) {
                return;
            }
            let mut ids = Vec::new();
            while ctx.stack.peek().is_some_and(|top| top != id) {
                if let Some(child) = ctx.stack.shift() {
                    ctx.entries.remove(&child);
                    ids.push(child);
                }
            }
            ids
        };
        for context_id in unclosed {
            self.report(TraxError::UnclosedContext { context_id });
        }
    }

    fn report_transition(&self, id: &str, action: &'static str, state: ContextState) {
        self.report(TraxError::ContextTransition {
            context_id: id.to_owned(),
            action,
            state: state.as_str(),
        });
    }
}

/// Future returned by [`EventStream::await_event`].
///
/// Resolves to `None` if the stream is dropped first.
#[must_use = "futures do nothing unless polled"]
pub struct AwaitEvent {
    rx: oneshot::Receiver<StreamEvent>,
}

impl Future for AwaitEvent {
    type Output = Option<StreamEvent>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

fn clamp_max_size(max_size: i64) -> i64 {
    if max_size >= 0 { max_size.max(2) } else { -1 }
}

fn elapsed_ms(since: Instant) -> f64 {
    (since.elapsed().as_secs_f64() * 1000.0 * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
