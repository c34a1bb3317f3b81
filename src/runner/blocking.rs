use std::{
    ops::ControlFlow,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread,
    time::Instant,
};

use tracing::{debug, trace, warn};

use super::{
    Flow, Runner, Session, WrapSlots, Wrapped, after_hook, finish_example, frame_description,
    keep_first, report_group_skipped, report_skipped, settle, warn_if_nested,
};
use crate::{
    context::Path,
    element::{Element, Example, Group, Hook, Node, Tag},
    error::{Outcome, RunError},
    filter,
    mode::{Blocking, BlockingWrapFn, Next},
    report::RunReport,
    reporter::Reporter,
};

impl<R: Reporter + 'static> Runner<R> {
    /// Runs `group` and everything below it on the calling thread.
    ///
    /// Concurrent groups borrow scoped worker threads for their children.
    pub fn run(&self, group: &Group<Blocking>) -> Result<RunReport, RunError> {
        warn_if_nested(group.name());

        let session = self.session();
        let _bound = session.ctx.bind();
        let started = Instant::now();

        let description = frame_description(group);
        let _frame = session.ctx.enter(Arc::clone(&description));
        run_group(&session, group, &Path::root(description))?;

        Ok(session.report(started))
    }
}

impl Group<Blocking> {
    /// Runs this group with a default [`Runner`].
    pub fn run(&self) -> Result<RunReport, RunError> {
        Runner::new().run(self)
    }
}

fn run_group(session: &Session, group: &Group<Blocking>, path: &Path) -> Result<(), RunError> {
    let selection = filter::select(group.children());
    if selection.filtered_out > 0 {
        trace!(group = %path, filtered_out = selection.filtered_out, "filtered children");
    }
    if selection.is_empty() {
        debug!(group = %path, "nothing selected, skipping hooks");
        return Ok(());
    }

    match run_hooks(session, group.before_all(), path)? {
        Flow::Continue => {}
        Flow::Skipped(reason) => {
            report_group_skipped(session, path, reason.as_deref());
            return Ok(());
        }
    }

    let result = match group.has_tag(Tag::Concurrent) {
        true => run_concurrent(session, group, &selection.nodes, path),
        false => selection
            .nodes
            .iter()
            .try_for_each(|node| run_element(session, group, node, path)),
    };

    let teardown = run_hooks(session, group.after_all(), path).map(drop);
    keep_first(result, teardown)
}

fn run_hooks(session: &Session, hooks: &[Hook<Blocking>], path: &Path) -> Result<Flow, RunError> {
    for hook in hooks.iter().filter(|hook| !hook.has_tag(Tag::Excluded)) {
        let description = frame_description(hook);
        let _frame = session.ctx.enter(Arc::clone(&description));
        trace!(group = %path, hook = %description, "running hook");

        let settled = settle(catch_unwind(AssertUnwindSafe(|| (hook.callback)())));
        if let ControlFlow::Break(result) = after_hook(hook, &description, path, settled) {
            return result;
        }
    }

    Ok(Flow::Continue)
}

/// Runs one child of `group` inside the group's around-each hooks.
fn run_element(
    session: &Session,
    group: &Group<Blocking>,
    node: &Node<Blocking>,
    path: &Path,
) -> Result<(), RunError> {
    let element = path.child(frame_description(node));

    match run_wrapped(session, group, node, path, &element)? {
        Wrapped::Done => Ok(()),
        Wrapped::Skipped(reason) => {
            report_skipped(session, node, &element, reason);
            Ok(())
        }
    }
}

/// Folds the around-each hooks, outermost first, into one continuation
/// around the element and its before-each and after-each hooks, and runs
/// it.
fn run_wrapped(
    session: &Session,
    group: &Group<Blocking>,
    node: &Node<Blocking>,
    path: &Path,
    element: &Path,
) -> Result<Wrapped, RunError> {
    let wraps: Vec<_> = group
        .wrap_hooks()
        .iter()
        .filter(|wrap| !wrap.has_tag(Tag::Excluded))
        .collect();
    if wraps.is_empty() {
        return run_paired(session, group, node, path, element).map(|()| Wrapped::Done);
    }

    let slots = WrapSlots::default();
    let slots = &slots;
    let mut next: Box<dyn FnOnce() -> Outcome + '_> = Box::new(move || {
        slots.mark_ran();
        match run_paired(session, group, node, path, element) {
            Ok(()) => Ok(()),
            Err(err) => slots.element_failed(err),
        }
    });

    for wrap in wraps.into_iter().rev() {
        let inner = next;
        next = Box::new(move || {
            let settled = settle(catch_unwind(AssertUnwindSafe(move || {
                (wrap.callback)(Next::new(inner))
            })));
            slots.layer(|| path.child(frame_description(wrap)).join(), settled)
        });
    }

    let outcome = next();
    slots.resolve(outcome, element)
}

/// Runs the element between the group's before-each and after-each hooks.
fn run_paired(
    session: &Session,
    group: &Group<Blocking>,
    node: &Node<Blocking>,
    path: &Path,
    element: &Path,
) -> Result<(), RunError> {
    match run_hooks(session, group.before_each(), path) {
        Ok(Flow::Continue) => {}
        Ok(Flow::Skipped(reason)) => {
            report_skipped(session, node, element, reason);
            return run_hooks(session, group.after_each(), path).map(drop);
        }
        Err(err) => {
            let teardown = run_hooks(session, group.after_each(), path).map(drop);
            return keep_first(Err(err), teardown);
        }
    }

    let result = run_node(session, node, element);
    let teardown = run_hooks(session, group.after_each(), path).map(drop);
    keep_first(result, teardown)
}

fn run_node(session: &Session, node: &Node<Blocking>, element: &Path) -> Result<(), RunError> {
    let _frame = session.ctx.enter(frame_description(node));
    match node {
        Node::Group(group) => match &group.within {
            Some(within) => run_within(session, group, within, element),
            None => run_group(session, group, element),
        },
        Node::Example(example) => {
            run_example(session, example, element);
            Ok(())
        }
    }
}

/// Runs `group` inside its within callback.
fn run_within(
    session: &Session,
    group: &Group<Blocking>,
    within: &BlockingWrapFn,
    element: &Path,
) -> Result<(), RunError> {
    let slots = WrapSlots::default();
    let next = Next::new(|| {
        slots.mark_ran();
        match run_group(session, group, element) {
            Ok(()) => Ok(()),
            Err(err) => slots.element_failed(err),
        }
    });

    let settled = settle(catch_unwind(AssertUnwindSafe(|| within(next))));
    let outcome = slots.layer(|| element.join(), settled);
    match slots.resolve(outcome, element)? {
        Wrapped::Done => Ok(()),
        Wrapped::Skipped(reason) => {
            report_group_skipped(session, element, reason.as_deref());
            Ok(())
        }
    }
}

fn run_example(session: &Session, example: &Example<Blocking>, element: &Path) {
    let description = element.join();
    trace!(example = %description, "running example");
    session.reporter.example_started(&description);

    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| (example.callback)()));
    finish_example(session, description, started, result);
}

/// Runs the selected children of a concurrent group on scoped worker
/// threads. Every element keeps its own before-each, around-each and
/// after-each pairing; the first error observed wins.
fn run_concurrent(
    session: &Session,
    group: &Group<Blocking>,
    nodes: &[&Node<Blocking>],
    path: &Path,
) -> Result<(), RunError> {
    let worker_count = session.worker_count(nodes.len());
    debug!(group = %path, workers = worker_count.get(), "running children concurrently");

    thread::scope(|scope| {
        let (push_job, wait_job) = crossbeam_channel::bounded::<&Node<Blocking>>(worker_count.get());
        let (push_result, wait_result) = crossbeam_channel::unbounded();

        for _ in 0..worker_count.get() {
            let wait_job = wait_job.clone();
            let push_result = push_result.clone();
            scope.spawn(move || {
                let _bound = session.ctx.bind();
                while let Ok(node) = wait_job.recv() {
                    if push_result.send(run_element(session, group, node, path)).is_err() {
                        // nobody collects results anymore
                        return;
                    }
                }
            });
        }
        drop(wait_job);
        drop(push_result);

        for node in nodes {
            if push_job.send(*node).is_err() {
                warn!(group = %path, "all workers exited early");
                break;
            }
        }
        drop(push_job);

        wait_result
            .iter()
            .fold(Ok(()), |first, result| keep_first(first, result))
    })
}
