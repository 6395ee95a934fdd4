#![forbid(unsafe_code)]

//! Processing-context spans around sync closures and futures.
//!
//! [`run_sync`] brackets a closure with `!PCS` / `!PCE`. [`Tracked`] does the
//! same for a future and additionally logs `!PCP` each time the future
//! suspends and `!PCR` each time it is polled again, so a computation that
//! spans several cycles still shows up as one context in the log.
//!
//! `Tracked` consults [`StepHooks`] around every poll. Processors use them to
//! maintain the call stack and to discard resumptions of superseded runs.
//! Every suspension hands the task's waker to [`StepHooks::suspended`], so a
//! run that goes stale can be woken and dropped at once instead of waiting
//! for its inner future.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

use futures::task::{ArcWake, AtomicWaker};
use serde_json::Value as Json;

use crate::stream::{EventStream, ProcessingContext};

/// Run `f` inside a processing context opened with `data`.
pub fn run_sync<R>(log: &EventStream, data: Json, f: impl FnOnce() -> R) -> R {
    let context = log.start_processing_context(data);
    let out = f();
    context.end();
    out
}

/// Callbacks invoked by [`Tracked`] around each step.
pub(crate) trait StepHooks<T> {
    /// Before the inner future is polled.
    fn step_start(&self) {}

    /// After the inner future returned.
    fn step_end(&self) {}

    /// Whether the run may proceed; a `false` drops it without further events.
    fn is_current(&self) -> bool {
        true
    }

    /// Called with the output, inside the context, before `!PCE`.
    fn complete(&self, _out: &T) {}

    /// The run returned `Pending`; `waker` schedules its next poll.
    fn suspended(&self, _waker: &Waker) {}
}

impl<T> StepHooks<T> for () {}

/// Wake handoff between the synchronous first poll and the task that takes
/// the future over.
#[derive(Default)]
pub(crate) struct Handoff {
    woken: AtomicBool,
    waker: AtomicWaker,
}

impl ArcWake for Handoff {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::Release);
        arc_self.waker.wake();
    }
}

/// Future wrapper logging a processing context per run.
///
/// Resolves to `None` when the hooks report the run as stale.
#[must_use = "futures do nothing unless polled"]
pub(crate) struct Tracked<F: Future, H> {
    future: F,
    hooks: H,
    log: EventStream,
    data: Json,
    context: Option<ProcessingContext>,
    handoff: Option<Arc<Handoff>>,
}

impl<F, H> Tracked<F, H>
where
    F: Future + Unpin,
    H: StepHooks<F::Output> + Unpin,
{
    pub(crate) fn new(log: EventStream, data: Json, future: F, hooks: H) -> Self {
        Self {
            future,
            hooks,
            log,
            data,
            context: None,
            handoff: None,
        }
    }

    /// Poll once with a handoff waker. On `Pending` the returned wrapper
    /// waits for that waker before polling the inner future again.
    pub(crate) fn poll_first(mut self) -> Result<Option<F::Output>, Self> {
        let handoff = Arc::new(Handoff::default());
        let waker = futures::task::waker(Arc::clone(&handoff));
        let mut cx = Context::from_waker(&waker);
        match Pin::new(&mut self).poll(&mut cx) {
            Poll::Ready(out) => Ok(out),
            Poll::Pending => {
                self.handoff = Some(handoff);
                Err(self)
            }
        }
    }
}

impl<F, H> Future for Tracked<F, H>
where
    F: Future + Unpin,
    H: StepHooks<F::Output> + Unpin,
{
    type Output = Option<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if !this.hooks.is_current() {
            if let Some(context) = this.context.take() {
                context.discard();
            }
            return Poll::Ready(None);
        }

        if let Some(handoff) = &this.handoff {
            handoff.waker.register(cx.waker());
            if !handoff.woken.swap(false, Ordering::AcqRel) {
                this.hooks.suspended(cx.waker());
                return Poll::Pending;
            }
            this.handoff = None;
        }

        let context = match &this.context {
            Some(context) => {
                context.resume();
                context.clone()
            }
            None => {
                let data = std::mem::take(&mut this.data);
                let context = this.log.start_processing_context(data);
                this.context = Some(context.clone());
                context
            }
        };

        this.hooks.step_start();
        let polled = Pin::new(&mut this.future).poll(cx);
        this.hooks.step_end();

        match polled {
            Poll::Ready(out) => {
                this.hooks.complete(&out);
                context.end();
                this.context = None;
                Poll::Ready(Some(out))
            }
            Poll::Pending => {
                context.pause();
                this.hooks.suspended(cx.waker());
                Poll::Pending
            }
        }
    }
}

/// Resolve to `value` after yielding to the executor once.
///
/// ```
/// use futures::executor::block_on;
/// use trax_core::defer;
///
/// assert_eq!(block_on(defer(7)), 7);
/// ```
pub fn defer<T: Unpin>(value: T) -> Defer<T> {
    Defer {
        value: Some(value),
        yielded: false,
    }
}

/// Future returned by [`defer`].
#[must_use = "futures do nothing unless polled"]
pub struct Defer<T> {
    value: Option<T>,
    yielded: bool,
}

impl<T: Unpin> Future for Defer<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if !self.yielded {
            self.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        match self.value.take() {
            Some(value) => Poll::Ready(value),
            None => Poll::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn kinds(log: &EventStream) -> Vec<String> {
        let mut out = Vec::new();
        log.scan(|e| {
            out.push(e.kind.clone());
            true
        });
        out
    }

    #[test]
    fn sync_span() {
        let log = EventStream::default();
        let out = run_sync(&log, json!({"name": "job"}), || {
            log.info("inside");
            42
        });
        assert_eq!(out, 42);
        assert_eq!(kinds(&log), vec!["!CS", "!PCS", "!LOG", "!PCE"]);
    }

    #[test]
    fn async_span_pauses_and_resumes() {
        let log = EventStream::default();
        let inner = log.clone();
        let fut = async move {
            inner.info("step 1");
            defer(()).await;
            inner.info("step 2");
            5
        }
        .boxed_local();
        let tracked = Tracked::new(log.clone(), json!({"name": "job"}), fut, ());
        assert_eq!(block_on(tracked), Some(5));
        assert_eq!(
            kinds(&log),
            vec!["!CS", "!PCS", "!LOG", "!PCP", "!PCR", "!LOG", "!PCE"]
        );
    }

    struct Counting {
        steps: Rc<Cell<u32>>,
        current: Rc<Cell<bool>>,
        done: Rc<RefCell<Option<u32>>>,
    }

    impl StepHooks<u32> for Counting {
        fn step_start(&self) {
            self.steps.set(self.steps.get() + 1);
        }
        fn is_current(&self) -> bool {
            self.current.get()
        }
        fn complete(&self, out: &u32) {
            *self.done.borrow_mut() = Some(*out);
        }
    }

    #[test]
    fn stale_runs_resolve_to_none() {
        let log = EventStream::default();
        let steps = Rc::new(Cell::new(0));
        let current = Rc::new(Cell::new(true));
        let done = Rc::new(RefCell::new(None));
        let hooks = Counting {
            steps: Rc::clone(&steps),
            current: Rc::clone(&current),
            done: Rc::clone(&done),
        };
        let flag = Rc::clone(&current);
        let fut = async move {
            defer(()).await;
            flag.set(false);
            defer(()).await;
            1
        }
        .boxed_local();
        let tracked = Tracked::new(log.clone(), json!({}), fut, hooks);
        assert_eq!(block_on(tracked), None);
        assert_eq!(steps.get(), 2);
        assert_eq!(*done.borrow(), None);
        assert!(!kinds(&log).contains(&"!PCE".to_owned()));
        assert_eq!(log.current_context_id(), None);
    }

    #[test]
    fn first_poll_hands_off_to_task() {
        let log = EventStream::default();
        let fut = defer(3).boxed_local();
        let tracked = Tracked::new(log.clone(), json!({}), fut, ());
        let pending = match tracked.poll_first() {
            Ok(_) => panic!("defer must suspend once"),
            Err(pending) => pending,
        };
        // Defer woke the handoff waker, so the task resumes it right away.
        assert_eq!(block_on(pending), Some(3));
        assert_eq!(kinds(&log), vec!["!CS", "!PCS", "!PCP", "!PCR", "!PCE"]);
    }

    struct Parked {
        current: Rc<Cell<bool>>,
        waker: Rc<RefCell<Option<Waker>>>,
    }

    impl StepHooks<u32> for Parked {
        fn is_current(&self) -> bool {
            self.current.get()
        }
        fn suspended(&self, waker: &Waker) {
            *self.waker.borrow_mut() = Some(waker.clone());
        }
    }

    #[test]
    fn stale_run_ends_when_woken() {
        use futures::executor::LocalPool;
        use futures::task::LocalSpawnExt;

        let log = EventStream::default();
        let current = Rc::new(Cell::new(true));
        let waker = Rc::new(RefCell::new(None));
        let hooks = Parked {
            current: Rc::clone(&current),
            waker: Rc::clone(&waker),
        };
        // Never resolves on its own.
        let fut = futures::future::pending::<u32>().boxed_local();
        let tracked = Tracked::new(log.clone(), json!({}), fut, hooks);
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);

        let mut pool = LocalPool::new();
        pool.spawner()
            .spawn_local(tracked.map(move |v| *sink.borrow_mut() = Some(v)))
            .unwrap();
        pool.run_until_stalled();
        assert_eq!(*out.borrow(), None);

        current.set(false);
        waker.borrow_mut().take().unwrap().wake();
        pool.run_until_stalled();
        assert_eq!(*out.borrow(), Some(None));
        assert_eq!(log.current_context_id(), None);
    }

    #[test]
    fn ready_on_first_poll() {
        let log = EventStream::default();
        let tracked = Tracked::new(log.clone(), json!({}), async { 9 }.boxed_local(), ());
        assert!(matches!(tracked.poll_first(), Ok(Some(9))));
    }
}
