//! Calling conventions for callbacks.
//!
//! Every callback in one tree shares a single [`CallMode`]: either plain
//! [`Blocking`] closures or [`Async`] closures that hand back futures. The mode
//! is a type parameter of [`Group`](crate::element::Group), so a blocking
//! example can never end up inside an async group.

use std::{fmt::Debug, sync::Arc};

use futures::future::BoxFuture;

use crate::error::Outcome;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Blocking {}
    impl Sealed for super::Async {}
}

/// Marker trait for the two supported calling conventions.
///
/// This trait is sealed, only [`Blocking`] and [`Async`] implement it.
pub trait CallMode: sealed::Sealed + Debug + Send + Sync + 'static {
    /// Callback type used by examples and hooks.
    type Callback: Clone + Send + Sync;

    /// Callback type used by around-each hooks.
    type WrapCallback: Clone + Send + Sync;
}

/// Callbacks run to completion on the calling thread.
#[derive(Debug)]
pub enum Blocking {}

/// Callbacks return futures and may suspend.
#[derive(Debug)]
pub enum Async {}

pub type BlockingFn = Arc<dyn Fn() -> Outcome + Send + Sync>;
pub type BlockingWrapFn = Arc<dyn Fn(Next<'_>) -> Outcome + Send + Sync>;
pub type AsyncFn = Arc<dyn Fn() -> BoxFuture<'static, Outcome> + Send + Sync>;
pub type AsyncWrapFn = Arc<dyn Fn(AsyncNext) -> BoxFuture<'static, Outcome> + Send + Sync>;

impl CallMode for Blocking {
    type Callback = BlockingFn;
    type WrapCallback = BlockingWrapFn;
}

impl CallMode for Async {
    type Callback = AsyncFn;
    type WrapCallback = AsyncWrapFn;
}

/// The continuation handed to a blocking around-each hook.
///
/// Calling [`run`](Self::run) executes everything the hook wraps: inner
/// around-each hooks and finally the element itself. Dropping it without
/// calling `run` means the element does not run.
pub struct Next<'a>(Box<dyn FnOnce() -> Outcome + 'a>);

impl<'a> Next<'a> {
    pub(crate) fn new(f: impl FnOnce() -> Outcome + 'a) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) -> Outcome {
        (self.0)()
    }
}

impl Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Next(...)")
    }
}

/// The continuation handed to an async around-each hook.
///
/// Await the future returned by [`run`](Self::run) to execute the wrapped
/// element.
pub struct AsyncNext(BoxFuture<'static, Outcome>);

impl AsyncNext {
    pub(crate) fn new(future: BoxFuture<'static, Outcome>) -> Self {
        Self(future)
    }

    pub fn run(self) -> BoxFuture<'static, Outcome> {
        self.0
    }
}

impl Debug for AsyncNext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AsyncNext(...)")
    }
}
