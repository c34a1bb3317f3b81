//! Walking a group tree and executing it.
//!
//! For every group the runner
//!
//! 1. selects the children that take part (see [`filter`](crate::filter)),
//!    returning right away when nothing is selected,
//! 2. runs the before-all hooks,
//! 3. runs every selected child wrapped in the group's before-each,
//!    around-each and after-each hooks, one after another or concurrently
//!    when the group is tagged [`Tag::Concurrent`](crate::Tag::Concurrent),
//! 4. runs the after-all hooks.
//!
//! Example failures are recorded in the [`RunReport`] and the run goes on.
//! Hook failures abort the rest of their group and surface as
//! [`RunError::Hook`]. Before they propagate, the after-each hooks of the
//! current element and the after-all hooks of every group whose before-all
//! hooks completed still run.
//!
//! [`Runner::run`] drives [`Blocking`](crate::Blocking) trees on the calling
//! thread, with a pool of scoped threads for concurrent groups.
//! [`Runner::run_async`] drives [`Async`](crate::Async) trees inside the
//! awaiting task.

use std::{
    borrow::Cow,
    cmp,
    num::NonZeroUsize,
    ops::ControlFlow,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::{
    context::{Path, RunContext},
    element::{Element, Hook, HookPhase, Node},
    error::{Outcome, RunError, Signal},
    mode::CallMode,
    outcome::{ExampleFailure, ExampleOutcome, ExampleStatus},
    panic::payload_as_string,
    report::RunReport,
    reporter::{NoReporter, Reporter},
};

mod blocking;
mod suspend;

/// Executes group trees.
///
/// ```
/// use specwalk::prelude::*;
///
/// let group = describe("Math", |g| {
///     g.it("adds", || {
///         assert_eq!(1 + 1, 2);
///         Ok(())
///     });
/// })
/// .unwrap();
///
/// let report = Runner::new().run(&group).unwrap();
/// assert_eq!(report.passed(), 1);
/// ```
#[derive(Debug)]
pub struct Runner<R = NoReporter> {
    threads: NonZeroUsize,
    reporter: Arc<R>,
}

impl Default for Runner<NoReporter> {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            reporter: Arc::new(NoReporter),
        }
    }
}

impl Runner<NoReporter> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: Reporter + 'static> Runner<R> {
    /// Upper bound for worker threads used by a concurrent group.
    pub fn with_thread_count(self, count: NonZeroUsize) -> Self {
        Self {
            threads: count,
            ..self
        }
    }

    pub fn with_reporter<T: Reporter + 'static>(self, reporter: T) -> Runner<T> {
        Runner {
            threads: self.threads,
            reporter: Arc::new(reporter),
        }
    }

    pub fn worker_count(&self, element_count: usize) -> NonZeroUsize {
        worker_count(self.threads, element_count)
    }

    fn session(&self) -> Session {
        let reporter: Arc<dyn Reporter> = self.reporter.clone();
        Session {
            ctx: RunContext::new(),
            reporter,
            threads: self.threads,
        }
    }
}

fn worker_count(threads: NonZeroUsize, element_count: usize) -> NonZeroUsize {
    NonZeroUsize::new(cmp::min(threads.get(), element_count)).unwrap_or(NonZeroUsize::MIN)
}

/// State of one top-level run.
pub(crate) struct Session {
    ctx: Arc<RunContext>,
    reporter: Arc<dyn Reporter>,
    threads: NonZeroUsize,
}

impl Session {
    fn worker_count(&self, element_count: usize) -> NonZeroUsize {
        worker_count(self.threads, element_count)
    }

    fn report(&self, started: Instant) -> RunReport {
        RunReport::new(self.ctx.take_outcomes(), started.elapsed())
    }
}

fn warn_if_nested(name: &str) {
    if RunContext::is_active() {
        error!(
            group = name,
            "starting a run while another run is active on this thread"
        );
    }
}

/// How a hook that did not fail ended.
#[derive(Debug)]
pub(crate) enum Flow {
    Continue,
    Skipped(Option<Cow<'static, str>>),
}

/// Collapses a caught callback result, turning failures and panics into a
/// message.
pub(crate) fn settle(result: thread::Result<Outcome>) -> Result<Flow, String> {
    match result {
        Ok(Ok(())) => Ok(Flow::Continue),
        Ok(Err(Signal::Skip { reason })) => Ok(Flow::Skipped(reason)),
        Ok(Err(Signal::Failed(err))) => Err(err.to_string()),
        Err(payload) => Err(format!("panicked: {}", payload_as_string(payload))),
    }
}

/// Decides whether the hooks after `hook` still run.
///
/// Skips in after hooks are ignored, skips in before hooks end the hook list.
fn after_hook<C: CallMode>(
    hook: &Hook<C>,
    description: &Arc<str>,
    path: &Path,
    settled: Result<Flow, String>,
) -> ControlFlow<Result<Flow, RunError>> {
    match settled {
        Ok(Flow::Continue) => ControlFlow::Continue(()),
        Ok(Flow::Skipped(reason)) => match hook.phase() {
            HookPhase::AfterEach | HookPhase::AfterAll => {
                info!(
                    group = %path,
                    hook = %description,
                    reason = reason.as_deref(),
                    "ignoring skip in teardown hook"
                );
                ControlFlow::Continue(())
            }
            HookPhase::BeforeAll | HookPhase::BeforeEach => {
                ControlFlow::Break(Ok(Flow::Skipped(reason)))
            }
        },
        Err(message) => {
            let description = path.child(Arc::clone(description)).join();
            debug!(hook = %description, %message, "hook failed");
            ControlFlow::Break(Err(RunError::hook(description, message)))
        }
    }
}

/// Keeps `first` if it is an error, logging `next` if that one is too.
pub(crate) fn keep_first(
    first: Result<(), RunError>,
    next: Result<(), RunError>,
) -> Result<(), RunError> {
    match (first, next) {
        (Ok(()), next) => next,
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(dropped)) => {
            warn!(error = %dropped, "dropping error, an earlier one is reported");
            Err(err)
        }
    }
}

fn report_group_skipped(session: &Session, path: &Path, reason: Option<&str>) {
    let description = path.join();
    info!(group = %description, reason, "group skipped");
    session.reporter.group_skipped(&description, reason);
}

/// Reports an element that a before-each or around-each hook skipped.
fn report_skipped<C: CallMode>(
    session: &Session,
    node: &Node<C>,
    element: &Path,
    reason: Option<Cow<'static, str>>,
) {
    match node {
        Node::Group(_) => report_group_skipped(session, element, reason.as_deref()),
        Node::Example(_) => {
            let description = element.join();
            info!(example = %description, reason = reason.as_deref(), "example skipped");
            session.reporter.example_started(&description);
            let outcome = ExampleOutcome::new(
                description,
                ExampleStatus::Skipped { reason },
                Duration::ZERO,
            );
            session.reporter.example_finished(&outcome);
            session.ctx.record(outcome);
        }
    }
}

fn finish_example(
    session: &Session,
    description: String,
    started: Instant,
    result: thread::Result<Outcome>,
) {
    let duration = started.elapsed();
    let status = match result {
        Ok(Ok(())) => ExampleStatus::Passed,
        Ok(Err(signal)) => ExampleStatus::from(signal),
        Err(payload) => ExampleStatus::Failed(ExampleFailure::Panicked(payload_as_string(payload))),
    };

    match &status {
        ExampleStatus::Skipped { reason } => {
            info!(example = %description, reason = reason.as_deref(), "example skipped");
        }
        ExampleStatus::Failed(failure) => {
            debug!(example = %description, message = failure.message(), "example failed");
        }
        _ => {}
    }

    let outcome = ExampleOutcome::new(description, status, duration);
    session.reporter.example_finished(&outcome);
    session.ctx.record(outcome);
}

/// Shared state of one around-each chain.
#[derive(Debug, Default)]
pub(crate) struct WrapSlots {
    element: Mutex<Option<RunError>>,
    blame: Mutex<Option<RunError>>,
    ran: AtomicBool,
}

/// How an around-each chain ended when no error escaped it.
pub(crate) enum Wrapped {
    Done,
    Skipped(Option<Cow<'static, str>>),
}

impl WrapSlots {
    fn mark_ran(&self) {
        self.ran.store(true, Ordering::Relaxed);
    }

    /// Stores the error of the wrapped element and hands the hooks a
    /// failure to propagate.
    fn element_failed(&self, err: RunError) -> Outcome {
        let message = err.to_string();
        let mut slot = self.element.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert(err);
        Err(Signal::failed(message))
    }

    /// Turns the settled result of one around-each hook into what its
    /// caller sees. The innermost failing hook takes the blame.
    fn layer(&self, description: impl FnOnce() -> String, settled: Result<Flow, String>) -> Outcome {
        match settled {
            Ok(Flow::Continue) => Ok(()),
            Ok(Flow::Skipped(reason)) => Err(Signal::Skip { reason }),
            Err(message) => {
                let mut slot = self.blame.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(RunError::hook(description(), message.clone()));
                }
                Err(Signal::failed(message))
            }
        }
    }

    fn resolve(&self, outcome: Outcome, element: &Path) -> Result<Wrapped, RunError> {
        let element_err = self.element.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(err) = element_err {
            return Err(err);
        }
        let blame = self.blame.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(err) = blame {
            return Err(err);
        }

        match outcome {
            Ok(()) => Ok(Wrapped::Done),
            Err(Signal::Skip { reason }) if !self.ran.load(Ordering::Relaxed) => {
                Ok(Wrapped::Skipped(reason))
            }
            Err(Signal::Skip { reason }) => {
                info!(
                    element = %element,
                    reason = reason.as_deref(),
                    "around-each hook skipped after the element ran"
                );
                Ok(Wrapped::Done)
            }
            Err(Signal::Failed(err)) => Err(RunError::hook(element.join(), err.to_string())),
        }
    }
}

fn frame_description<E: Element + ?Sized>(element: &E) -> Arc<str> {
    Arc::from(element.description())
}
