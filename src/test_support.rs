use std::sync::{Arc, Mutex};

use crate::{error::Outcome, outcome::ExampleOutcome, reporter::Reporter};

/// Ordered log of what ran, shared by every callback of a test tree.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    /// A callback that logs `entry` and succeeds.
    pub fn step(&self, entry: &'static str) -> impl Fn() -> Outcome + Send + Sync + use<> {
        let journal = self.clone();
        move || {
            journal.push(entry);
            Ok(())
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Collects every finished example and skipped group.
#[derive(Debug, Clone, Default)]
pub struct Collect {
    pub outcomes: Arc<Mutex<Vec<ExampleOutcome>>>,
    pub skipped_groups: Arc<Mutex<Vec<String>>>,
}

impl Reporter for Collect {
    fn example_finished(&self, outcome: &ExampleOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }

    fn group_skipped(&self, description: &str, _: Option<&str>) {
        self.skipped_groups.lock().unwrap().push(description.to_string());
    }
}

macro_rules! nonzero {
    (0) => {
        compile_error!("0 is zero")
    };

    ($value:literal) => {
        std::convert::TryFrom::try_from($value).unwrap()
    };
}

pub(crate) use nonzero;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{builder::describe, runner::Runner};

    #[test]
    fn collect_sees_every_example() {
        let collect = Collect::default();
        let group = describe("Root", |g| {
            g.it("a", || Ok(()));
            g.describe("Skipped", |g| {
                g.before_all(crate::error::skip);
                g.it("b", || Ok(()));
            });
        })
        .unwrap();

        Runner::new()
            .with_reporter(collect.clone())
            .run(&group)
            .unwrap();

        let outcomes = collect.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].description, "Root, a");
        assert_eq!(*collect.skipped_groups.lock().unwrap(), vec!["Root, Skipped"]);
    }
}
