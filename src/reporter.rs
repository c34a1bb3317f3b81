//! Hooking a test harness into a run.
//!
//! The runner tells a [`Reporter`] about every example it starts and
//! finishes, and about groups that were skipped as a whole. All methods have
//! empty default implementations, so an adapter only overrides what it
//! needs.
//!
//! Reporters are shared across worker threads when a group runs its
//! children concurrently, hence the `Send + Sync` bound.

use crate::outcome::ExampleOutcome;

pub trait Reporter: Send + Sync {
    /// An example is about to run.
    fn example_started(&self, description: &str) {
        let _ = description;
    }

    /// An example finished, was skipped, or failed.
    fn example_finished(&self, outcome: &ExampleOutcome) {
        let _ = outcome;
    }

    /// A before-all hook skipped the whole group.
    fn group_skipped(&self, description: &str, reason: Option<&str>) {
        let _ = (description, reason);
    }
}

/// A [`Reporter`] that reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReporter;

impl Reporter for NoReporter {}

impl<F> Reporter for F
where
    F: Fn(&ExampleOutcome) + Send + Sync,
{
    fn example_finished(&self, outcome: &ExampleOutcome) {
        self(outcome)
    }
}
