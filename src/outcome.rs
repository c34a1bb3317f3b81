use std::{borrow::Cow, time::Duration};

use crate::error::Signal;

/// The outcome of a single example.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ExampleOutcome {
    /// Full description, e.g. `"Root, Mid, Leaf"`.
    pub description: String,
    pub status: ExampleStatus,
    pub duration: Duration,
}

impl ExampleOutcome {
    pub(crate) fn new(description: String, status: ExampleStatus, duration: Duration) -> Self {
        Self {
            description,
            status,
            duration,
        }
    }

    pub fn passed(&self) -> bool {
        self.status.passed()
    }

    pub fn skipped(&self) -> bool {
        self.status.skipped()
    }

    pub fn failed(&self) -> bool {
        self.status.failed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExampleStatus {
    Passed,
    Skipped { reason: Option<Cow<'static, str>> },
    Failed(ExampleFailure),
}

impl ExampleStatus {
    pub fn passed(&self) -> bool {
        matches!(self, ExampleStatus::Passed)
    }

    pub fn skipped(&self) -> bool {
        matches!(self, ExampleStatus::Skipped { .. })
    }

    pub fn failed(&self) -> bool {
        matches!(self, ExampleStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExampleFailure {
    /// The callback returned an error.
    Error(String),
    Panicked(String),
}

impl ExampleFailure {
    pub fn message(&self) -> &str {
        match self {
            ExampleFailure::Error(message) | ExampleFailure::Panicked(message) => message,
        }
    }
}

impl From<Signal> for ExampleStatus {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Skip { reason } => ExampleStatus::Skipped { reason },
            Signal::Failed(err) => ExampleStatus::Failed(ExampleFailure::Error(err.to_string())),
        }
    }
}
