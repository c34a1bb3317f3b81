use std::time::Duration;

use crate::{
    error::RunError,
    outcome::{ExampleOutcome, ExampleStatus},
};

/// Everything a finished run produced.
///
/// Outcomes are ordered by completion, which matches declaration order
/// unless a group runs its children concurrently.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RunReport {
    pub outcomes: Vec<ExampleOutcome>,
    pub duration: Duration,
}

impl RunReport {
    pub(crate) fn new(outcomes: Vec<ExampleOutcome>, duration: Duration) -> Self {
        Self { outcomes, duration }
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExampleOutcome> {
        self.outcomes.iter().filter(|o| o.failed())
    }

    /// Turns failed examples into an error.
    pub fn into_result(self) -> Result<Self, RunError> {
        let first = self.failures().next().map(|outcome| match &outcome.status {
            ExampleStatus::Failed(failure) => {
                format!("{} {}", outcome.description, failure.message())
            }
            _ => outcome.description.clone(),
        });

        match first {
            None => Ok(self),
            Some(first) => Err(RunError::Examples {
                failed: self.failed(),
                first,
            }),
        }
    }
}
