use std::{
    future::Future,
    ops::ControlFlow,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Instant,
};

use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::FuturesUnordered,
};
use tracing::{debug, trace};

use super::{
    Flow, Runner, Session, WrapSlots, Wrapped, after_hook, finish_example, frame_description,
    keep_first, report_group_skipped, report_skipped, settle, warn_if_nested,
};
use crate::{
    context::{Bound, Path},
    element::{Element, Example, Group, Hook, Node, Tag, WrapHook},
    error::{Outcome, RunError},
    filter,
    mode::{Async, AsyncNext, AsyncWrapFn},
    report::RunReport,
    reporter::Reporter,
};

impl<R: Reporter + 'static> Runner<R> {
    /// Runs `group` inside the task awaiting the returned future.
    ///
    /// Children of concurrent groups are polled together on that task, no
    /// executor is spawned on. Dropping the future cancels the run.
    pub fn run_async(
        &self,
        group: &Group<Async>,
    ) -> impl Future<Output = Result<RunReport, RunError>> + Send + use<R> {
        let session = Arc::new(self.session());
        let group = Arc::new(group.clone());

        async move {
            warn_if_nested(group.name());
            let started = Instant::now();

            let description = frame_description(&*group);
            let _frame = session.ctx.enter(Arc::clone(&description));
            let walk = run_group(Arc::clone(&session), group, Path::root(description));
            Bound::new(Arc::clone(&session.ctx), walk).await?;

            Ok(session.report(started))
        }
    }
}

impl Group<Async> {
    /// Runs this group with a default [`Runner`].
    pub fn run_async(&self) -> impl Future<Output = Result<RunReport, RunError>> + Send + use<> {
        Runner::new().run_async(self)
    }
}

fn run_group(
    session: Arc<Session>,
    group: Arc<Group<Async>>,
    path: Path,
) -> BoxFuture<'static, Result<(), RunError>> {
    async move {
        let selection = filter::select(group.children());
        if selection.filtered_out > 0 {
            trace!(group = %path, filtered_out = selection.filtered_out, "filtered children");
        }
        let nodes: Vec<Node<Async>> = selection.nodes.into_iter().cloned().collect();
        if nodes.is_empty() {
            debug!(group = %path, "nothing selected, skipping hooks");
            return Ok(());
        }

        match run_hooks(&session, group.before_all(), &path).await? {
            Flow::Continue => {}
            Flow::Skipped(reason) => {
                report_group_skipped(&session, &path, reason.as_deref());
                return Ok(());
            }
        }

        let result = match group.has_tag(Tag::Concurrent) {
            true => run_concurrent(&session, &group, nodes, &path).await,
            false => {
                let mut result = Ok(());
                for node in nodes {
                    result = run_element(&session, &group, node, &path).await;
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
        };

        let teardown = run_hooks(&session, group.after_all(), &path).await.map(drop);
        keep_first(result, teardown)
    }
    .boxed()
}

async fn run_hooks(
    session: &Session,
    hooks: &[Hook<Async>],
    path: &Path,
) -> Result<Flow, RunError> {
    for hook in hooks.iter().filter(|hook| !hook.has_tag(Tag::Excluded)) {
        let description = frame_description(hook);
        let _frame = session.ctx.enter(Arc::clone(&description));
        trace!(group = %path, hook = %description, "running hook");

        let callback = Arc::clone(&hook.callback);
        let caught = AssertUnwindSafe(async move { callback().await })
            .catch_unwind()
            .await;
        if let ControlFlow::Break(result) = after_hook(hook, &description, path, settle(caught)) {
            return result;
        }
    }

    Ok(Flow::Continue)
}

async fn run_element(
    session: &Arc<Session>,
    group: &Arc<Group<Async>>,
    node: Node<Async>,
    path: &Path,
) -> Result<(), RunError> {
    let element = path.child(frame_description(&node));

    match run_wrapped(session, group, node.clone(), path, &element).await? {
        Wrapped::Done => Ok(()),
        Wrapped::Skipped(reason) => {
            report_skipped(session, &node, &element, reason);
            Ok(())
        }
    }
}

/// Chains the around-each hooks, outermost first, around the element and
/// its before-each and after-each hooks. Each hook receives the rest of the
/// chain as an [`AsyncNext`].
async fn run_wrapped(
    session: &Arc<Session>,
    group: &Arc<Group<Async>>,
    node: Node<Async>,
    path: &Path,
    element: &Path,
) -> Result<Wrapped, RunError> {
    let wraps: Vec<WrapHook<Async>> = group
        .wrap_hooks()
        .iter()
        .filter(|wrap| !wrap.has_tag(Tag::Excluded))
        .cloned()
        .collect();
    let paired = run_paired(
        Arc::clone(session),
        Arc::clone(group),
        node,
        path.clone(),
        element.clone(),
    );
    if wraps.is_empty() {
        return paired.await.map(|()| Wrapped::Done);
    }

    let slots = Arc::new(WrapSlots::default());
    let mut next: BoxFuture<'static, Outcome> = {
        let slots = Arc::clone(&slots);
        async move {
            slots.mark_ran();
            match paired.await {
                Ok(()) => Ok(()),
                Err(err) => slots.element_failed(err),
            }
        }
        .boxed()
    };

    for wrap in wraps.into_iter().rev() {
        let inner = next;
        let slots = Arc::clone(&slots);
        let blame = path.child(frame_description(&wrap)).join();
        next = async move {
            let caught = AssertUnwindSafe(async move { (wrap.callback)(AsyncNext::new(inner)).await })
                .catch_unwind()
                .await;
            slots.layer(|| blame, settle(caught))
        }
        .boxed();
    }

    let outcome = next.await;
    slots.resolve(outcome, element)
}

/// Runs the element between the group's before-each and after-each hooks.
fn run_paired(
    session: Arc<Session>,
    group: Arc<Group<Async>>,
    node: Node<Async>,
    path: Path,
    element: Path,
) -> BoxFuture<'static, Result<(), RunError>> {
    async move {
        match run_hooks(&session, group.before_each(), &path).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Skipped(reason)) => {
                report_skipped(&session, &node, &element, reason);
                return run_hooks(&session, group.after_each(), &path).await.map(drop);
            }
            Err(err) => {
                let teardown = run_hooks(&session, group.after_each(), &path).await.map(drop);
                return keep_first(Err(err), teardown);
            }
        }

        let result = run_node(Arc::clone(&session), node, element).await;
        let teardown = run_hooks(&session, group.after_each(), &path).await.map(drop);
        keep_first(result, teardown)
    }
    .boxed()
}

fn run_node(
    session: Arc<Session>,
    node: Node<Async>,
    element: Path,
) -> BoxFuture<'static, Result<(), RunError>> {
    async move {
        let _frame = session.ctx.enter(frame_description(&node));
        match node {
            Node::Group(group) => {
                let within = group.within.clone();
                match within {
                    Some(within) => run_within(session, group, within, element).await,
                    None => run_group(session, group, element).await,
                }
            }
            Node::Example(example) => {
                run_example(&session, &example, &element).await;
                Ok(())
            }
        }
    }
    .boxed()
}

/// Runs `group` inside the future its within callback returns.
async fn run_within(
    session: Arc<Session>,
    group: Arc<Group<Async>>,
    within: AsyncWrapFn,
    element: Path,
) -> Result<(), RunError> {
    let slots = Arc::new(WrapSlots::default());
    let next = {
        let slots = Arc::clone(&slots);
        let walk = run_group(Arc::clone(&session), group, element.clone());
        async move {
            slots.mark_ran();
            match walk.await {
                Ok(()) => Ok(()),
                Err(err) => slots.element_failed(err),
            }
        }
        .boxed()
    };

    let caught = AssertUnwindSafe(async move { within(AsyncNext::new(next)).await })
        .catch_unwind()
        .await;
    let outcome = slots.layer(|| element.join(), settle(caught));
    match slots.resolve(outcome, &element)? {
        Wrapped::Done => Ok(()),
        Wrapped::Skipped(reason) => {
            report_group_skipped(&session, &element, reason.as_deref());
            Ok(())
        }
    }
}

async fn run_example(session: &Session, example: &Example<Async>, element: &Path) {
    let description = element.join();
    trace!(example = %description, "running example");
    session.reporter.example_started(&description);

    let started = Instant::now();
    let callback = Arc::clone(&example.callback);
    let caught = AssertUnwindSafe(async move { callback().await })
        .catch_unwind()
        .await;
    finish_example(session, description, started, caught);
}

/// Polls every selected child of a concurrent group together. Every element
/// keeps its own hook pairing; the first error observed wins.
async fn run_concurrent(
    session: &Arc<Session>,
    group: &Arc<Group<Async>>,
    nodes: Vec<Node<Async>>,
    path: &Path,
) -> Result<(), RunError> {
    debug!(group = %path, elements = nodes.len(), "polling children concurrently");

    let mut pending: FuturesUnordered<_> = nodes
        .into_iter()
        .map(|node| run_element(session, group, node, path))
        .collect();

    let mut first = Ok(());
    while let Some(result) = pending.next().await {
        first = keep_first(first, result);
    }
    first
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        builder::describe_async,
        context::RunContext,
        error::{fail, skip_because},
    };

    #[test]
    fn failing_wrap_hook_takes_the_blame() {
        let group = describe_async("Root", |g| {
            g.wrap_hook(WrapHook::<Async>::new("guard", |next: AsyncNext| async move {
                next.run().await?;
                fail("leaked handle")
            }));
            g.it("a", || async { Ok(()) });
        })
        .unwrap();

        let err = block_on(group.run_async()).unwrap_err();
        assert_eq!(
            err,
            RunError::hook("Root, around each: guard".into(), "leaked handle".into())
        );
    }

    #[test]
    fn wrap_hook_skipping_before_the_element_skips_it() {
        let group = describe_async("Root", |g| {
            g.around_each(|_next| async { skip_because("offline") });
            g.it("a", || async { Ok(()) });
        })
        .unwrap();

        let report = block_on(group.run_async()).unwrap();
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.outcomes[0].description, "Root, a");
    }

    #[test]
    fn context_is_bound_while_polling() {
        let group = describe_async("Root", |g| {
            g.describe("Mid", |g| {
                g.it("Leaf", || async {
                    let description = RunContext::current().map(|ctx| ctx.description());
                    match description.as_deref() {
                        Some("Root, Mid, Leaf") => Ok(()),
                        other => fail(format!("unexpected description {other:?}")),
                    }
                });
            });
        })
        .unwrap();

        let report = block_on(group.run_async()).unwrap();
        assert_eq!(report.passed(), 1);
        assert!(RunContext::current().is_none());
    }
}
