//! State shared by everything that executes during one top-level run.
//!
//! A [`RunContext`] tracks the elements currently executing. Callbacks reach
//! it through [`RunContext::current`], which reads a thread local binding the
//! runner installs while it drives the run: for the whole run in blocking
//! mode (including worker threads), and around every poll in async mode.

use std::{
    cell::RefCell,
    fmt,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use crate::outcome::ExampleOutcome;

thread_local! {
    static CURRENT: RefCell<Option<Arc<RunContext>>> = const { RefCell::new(None) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Frame {
    id: u64,
    description: Arc<str>,
}

/// Per-run execution state.
#[derive(Debug, Default)]
pub struct RunContext {
    stack: Mutex<Vec<Frame>>,
    next_id: AtomicU64,
    outcomes: Mutex<Vec<ExampleOutcome>>,
}

impl RunContext {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The context of the run executing on this thread, if any.
    pub fn current() -> Option<Arc<RunContext>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub(crate) fn is_active() -> bool {
        CURRENT.with(|current| current.borrow().is_some())
    }

    /// Descriptions of every element on the stack, outermost first, joined
    /// by `", "`.
    ///
    /// Under concurrent execution frames of sibling tasks interleave here.
    /// Reports use a per-task path instead.
    pub fn description(&self) -> String {
        let stack = lock(&self.stack);
        let parts: Vec<&str> = stack.iter().map(|frame| frame.description.as_ref()).collect();
        parts.join(", ")
    }

    pub fn depth(&self) -> usize {
        lock(&self.stack).len()
    }

    /// Pushes a frame that stays on the stack until the guard drops.
    pub(crate) fn enter(self: &Arc<Self>, description: Arc<str>) -> FrameGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.stack).push(Frame { id, description });
        FrameGuard {
            ctx: Arc::clone(self),
            id,
        }
    }

    /// Makes this context the current one on this thread until the guard
    /// drops, restoring the previous binding afterwards.
    pub(crate) fn bind(self: &Arc<Self>) -> BindGuard {
        let previous = CURRENT.with(|current| current.replace(Some(Arc::clone(self))));
        BindGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn record(&self, outcome: ExampleOutcome) {
        lock(&self.outcomes).push(outcome);
    }

    pub(crate) fn take_outcomes(&self) -> Vec<ExampleOutcome> {
        std::mem::take(&mut *lock(&self.outcomes))
    }
}

#[derive(Debug)]
pub(crate) struct FrameGuard {
    ctx: Arc<RunContext>,
    id: u64,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let mut stack = lock(&self.ctx.stack);
        if let Some(pos) = stack.iter().rposition(|frame| frame.id == self.id) {
            stack.remove(pos);
        }
    }
}

#[derive(Debug)]
pub(crate) struct BindGuard {
    previous: Option<Arc<RunContext>>,
    // the binding is per thread, so the guard must stay on it
    _not_send: PhantomData<*const ()>,
}

impl Drop for BindGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Descriptions from the root group down to one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Path(Vec<Arc<str>>);

impl Path {
    pub(crate) fn root(description: Arc<str>) -> Self {
        Self(vec![description])
    }

    pub(crate) fn child(&self, description: Arc<str>) -> Self {
        let mut segments = self.0.clone();
        segments.push(description);
        Self(segments)
    }

    pub(crate) fn join(&self) -> String {
        let parts: Vec<&str> = self.0.iter().map(AsRef::as_ref).collect();
        parts.join(", ")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join())
    }
}

/// A future that has a [`RunContext`] bound while it is polled.
pub(crate) struct Bound<F> {
    ctx: Arc<RunContext>,
    future: F,
}

impl<F> Bound<F> {
    pub(crate) fn new(ctx: Arc<RunContext>, future: F) -> Self {
        Self { ctx, future }
    }
}

impl<F: Future + Unpin> Future for Bound<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _bound = this.ctx.bind();
        Pin::new(&mut this.future).poll(cx)
    }
}
