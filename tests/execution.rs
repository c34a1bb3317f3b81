mod common;

use std::{
    cell::Cell,
    num::NonZeroUsize,
    sync::{Arc, Barrier, Mutex},
};

use common::{Counter, Journal};
use pretty_assertions::assert_eq;
use specwalk::{
    RunError, Runner, Tag,
    context::RunContext,
    describe,
    error::{fail, skip, skip_because},
    outcome::{ExampleFailure, ExampleStatus},
};

#[test]
fn hooks_run_around_every_example() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.before_all(journal.step("before all"));
        g.before_each(journal.step("before each"));
        g.it("one", journal.step("one"));
        g.it("two", journal.step("two"));
        g.it("three", journal.step("three"));
        g.after_each(journal.step("after each"));
        g.after_all(journal.step("after all"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(report.passed(), 3);
    assert_eq!(
        journal.entries(),
        vec![
            "before all",
            "before each",
            "one",
            "after each",
            "before each",
            "two",
            "after each",
            "before each",
            "three",
            "after each",
            "after all",
        ]
    );
}

#[test]
fn outer_each_hooks_wrap_nested_groups() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.before_each(journal.step("outer before"));
        g.describe("Inner", |g| {
            g.before_all(journal.step("inner before all"));
            g.it("a", journal.step("a"));
            g.it("b", journal.step("b"));
        });
        g.after_each(journal.step("outer after"));
    })
    .unwrap();

    group.run().unwrap();
    assert_eq!(
        journal.entries(),
        vec!["outer before", "inner before all", "a", "b", "outer after"]
    );
}

#[test]
fn focus_propagates_to_enclosing_groups() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.before_all(journal.step("root before all"));
        g.it("A", journal.step("A"));
        g.describe("Inner", |g| {
            g.before_all(journal.step("inner before all"));
            g.it("B", journal.step("B")).focused();
            g.it("C", journal.step("C"));
            g.after_all(journal.step("inner after all"));
        });
        g.after_all(journal.step("root after all"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].description, "Root, Inner, B");
    assert_eq!(
        journal.entries(),
        vec![
            "root before all",
            "inner before all",
            "B",
            "inner after all",
            "root after all",
        ]
    );
}

#[test]
fn excluded_examples_do_not_run() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.it("A", journal.step("A")).excluded();
        g.it("B", journal.step("B"));
    })
    .unwrap();

    group.run().unwrap();
    assert_eq!(journal.entries(), vec!["B"]);
}

#[test]
fn all_excluded_runs_no_hooks() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.before_all(journal.step("before all"));
        g.before_each(journal.step("before each"));
        g.it("A", journal.step("A")).excluded();
        g.it("B", journal.step("B")).excluded();
        g.after_each(journal.step("after each"));
        g.after_all(journal.step("after all"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert!(report.outcomes.is_empty());
    assert!(journal.entries().is_empty());
}

#[test]
fn excluded_hooks_do_not_run() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.before_each(journal.step("kept"));
        g.before_each(journal.step("dropped")).excluded();
        g.around_each(|_| fail("never called")).excluded();
        g.it("A", journal.step("A"));
    })
    .unwrap();

    group.run().unwrap();
    assert_eq!(journal.entries(), vec!["kept", "A"]);
}

#[test]
fn around_each_hooks_nest_in_declaration_order() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        let log = journal.clone();
        g.around_each(move |next| {
            log.push("W1-before");
            let outcome = next.run();
            log.push("W1-after");
            outcome
        });
        let log = journal.clone();
        g.around_each(move |next| {
            log.push("W2-before");
            let outcome = next.run();
            log.push("W2-after");
            outcome
        });
        g.it("E", journal.step("E"));
    })
    .unwrap();

    group.run().unwrap();
    assert_eq!(
        journal.entries(),
        vec!["W1-before", "W2-before", "E", "W2-after", "W1-after"]
    );
}

#[test]
fn around_each_that_never_continues_suppresses_the_element() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.around_each(|_next| Ok(()));
        g.it("E", journal.step("E"));
        g.after_each(journal.step("after each"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert!(report.outcomes.is_empty());
    assert!(journal.entries().is_empty());
}

#[test]
fn around_each_encloses_the_per_element_hooks() {
    let journal = Journal::new();
    let group = describe("Around each", |g| {
        g.before_all(journal.step("before all"));
        let log = journal.clone();
        g.around_each(move |next| {
            log.push("around start");
            let outcome = next.run();
            log.push("around end");
            outcome
        });
        g.before_each(journal.step("before each"));
        g.it("works", journal.step("it"));
        g.after_each(journal.step("after each"));
        g.after_all(journal.step("after all"));
    })
    .unwrap();

    group.run().unwrap();
    assert_eq!(
        journal.entries(),
        vec![
            "before all",
            "around start",
            "before each",
            "it",
            "after each",
            "around end",
            "after all",
        ]
    );
}

#[test]
fn before_each_skip_stays_inside_around_each() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        let log = journal.clone();
        g.around_each(move |next| {
            log.push("around start");
            let outcome = next.run();
            log.push("around end");
            outcome
        });
        g.before_each(|| skip_because("not today"));
        g.it("a", journal.step("a"));
        g.after_each(journal.step("after each"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(report.skipped(), 1);
    assert_eq!(
        journal.entries(),
        vec!["around start", "after each", "around end"]
    );
}

#[test]
fn skip_in_before_each_skips_only_that_element() {
    let journal = Journal::new();
    let calls = Counter::default();
    let group = describe("Root", |g| {
        let log = journal.clone();
        let calls = calls.clone();
        g.before_each(move || {
            calls.bump();
            log.push("before each");
            match calls.get() {
                2 => skip_because("second is flaky"),
                _ => Ok(()),
            }
        });
        g.it("first", journal.step("first"));
        g.it("second", journal.step("second"));
        g.after_each(journal.step("after each"));
        g.after_all(journal.step("after all"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(
        journal.entries(),
        vec![
            "before each",
            "first",
            "after each",
            "before each",
            "after each",
            "after all",
        ]
    );
    assert_eq!(report.passed(), 1);
    assert_eq!(
        report.outcomes[1].status,
        ExampleStatus::Skipped {
            reason: Some("second is flaky".into())
        }
    );
}

#[test]
fn skip_in_before_all_skips_the_group() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.describe("Offline", |g| {
            g.before_all(skip);
            g.before_all(journal.step("second before all"));
            g.it("a", journal.step("a"));
            g.after_all(journal.step("offline after all"));
        });
        g.it("b", journal.step("b"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(journal.entries(), vec!["b"]);
    assert_eq!(report.passed(), 1);
}

#[test]
fn example_failures_do_not_stop_siblings() {
    let group = describe("Root", |g| {
        g.it("errors", || fail("expected 1, got 2"));
        g.it("panics", || panic!("unreachable state"));
        g.it("passes", || Ok(()));
        g.it("skips", skip);
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(report.passed(), 1);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 2);
    assert_eq!(
        report.outcomes[0].status,
        ExampleStatus::Failed(ExampleFailure::Error("expected 1, got 2".into()))
    );
    assert_eq!(
        report.outcomes[1].status,
        ExampleStatus::Failed(ExampleFailure::Panicked("unreachable state".into()))
    );

    assert_eq!(
        report.into_result().unwrap_err(),
        RunError::Examples {
            failed: 2,
            first: "Root, errors expected 1, got 2".into(),
        }
    );
}

#[test]
fn hook_failure_aborts_the_group() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.describe("Broken", |g| {
            g.before_all(|| fail("cannot connect"));
            g.it("a", journal.step("a"));
        });
        g.it("b", journal.step("b"));
    })
    .unwrap();

    let err = group.run().unwrap_err();
    assert_eq!(err.to_string(), "Root, Broken, before all cannot connect");
    assert!(journal.entries().is_empty());
}

#[test]
fn concurrent_examples_all_run() {
    let counter = Counter::default();
    let group = describe("Root", |g| {
        for n in 0..10 {
            let counter = counter.clone();
            g.it(format!("bump {n}"), move || {
                counter.bump();
                Ok(())
            });
        }
    })
    .unwrap()
    .with_tag(Tag::Concurrent);

    let report = group.run().unwrap();
    assert_eq!(counter.get(), 10);
    assert_eq!(report.passed(), 10);
}

#[test]
fn concurrent_elements_keep_their_hook_pairing() {
    let pairs = Arc::new(Mutex::new(Vec::new()));
    let group = describe("Root", |g| {
        let log = Arc::clone(&pairs);
        g.before_each(move || {
            let depth = RunContext::current().map(|ctx| ctx.depth()).unwrap_or(0);
            log.lock().unwrap().push(depth > 0);
            Ok(())
        });
        for n in 0..8 {
            g.it(format!("example {n}"), || Ok(()));
        }
    })
    .unwrap()
    .with_tag(Tag::Concurrent);

    let report = Runner::new()
        .with_thread_count(NonZeroUsize::new(3).unwrap())
        .run(&group)
        .unwrap();
    assert_eq!(report.passed(), 8);
    assert_eq!(*pairs.lock().unwrap(), vec![true; 8]);
}

#[test]
#[cfg_attr(all(ci, target_os = "macos"), ignore = "too slow on macos")]
fn concurrent_examples_overlap() {
    let barrier = Arc::new(Barrier::new(2));
    let group = describe("Root", |g| {
        for name in ["left", "right"] {
            let barrier = Arc::clone(&barrier);
            g.it(name, move || {
                barrier.wait();
                Ok(())
            });
        }
    })
    .unwrap()
    .with_tag(Tag::Concurrent);

    let report = Runner::new()
        .with_thread_count(NonZeroUsize::new(2).unwrap())
        .run(&group)
        .unwrap();
    assert_eq!(report.passed(), 2);
}

thread_local! {
    static CURRENT_VALUE: Cell<Option<u32>> = const { Cell::new(None) };
}

#[test]
fn within_runs_the_whole_group_inside_its_callback() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.it("before", journal.step("sibling before"));
        let log = journal.clone();
        g.within(
            "inside a callback",
            move |next| {
                log.push("within start");
                let outcome = next.run();
                log.push("within end");
                outcome
            },
            |g| {
                g.before_all(journal.step("before all"));
                g.before_each(journal.step("before each"));
                g.it("works", journal.step("it"));
                g.after_all(journal.step("after all"));
            },
        );
        g.it("after", journal.step("sibling after"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(report.passed(), 3);
    assert_eq!(report.outcomes[1].description, "Root, inside a callback, works");
    assert_eq!(
        journal.entries(),
        vec![
            "sibling before",
            "within start",
            "before all",
            "before each",
            "it",
            "after all",
            "within end",
            "sibling after",
        ]
    );
}

#[test]
fn within_binds_state_for_its_examples() {
    let group = describe("Within", |g| {
        g.each(1..=2u32, |g, value| {
            g.within(
                format!("with value {value}"),
                move |next| {
                    CURRENT_VALUE.set(Some(value));
                    let outcome = next.run();
                    CURRENT_VALUE.set(None);
                    outcome
                },
                |g| {
                    g.it("has the bound value", move || {
                        let description = RunContext::current().map(|ctx| ctx.description());
                        let expected = format!("Within, with value {value}, has the bound value");
                        match (CURRENT_VALUE.get(), description) {
                            (Some(bound), Some(description))
                                if bound == value && description == expected =>
                            {
                                Ok(())
                            }
                            other => fail(format!("unexpected state {other:?}")),
                        }
                    });
                },
            );
        });
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(report.passed(), 2);
    assert_eq!(CURRENT_VALUE.get(), None);
}

#[test]
fn within_skip_skips_the_group() {
    let journal = Journal::new();
    let group = describe("Root", |g| {
        g.within(
            "Offline",
            |_next| skip_because("no network"),
            |g| {
                g.before_all(journal.step("before all"));
                g.it("a", journal.step("a"));
            },
        );
        g.it("b", journal.step("b"));
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(journal.entries(), vec!["b"]);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.passed(), 1);
}

#[test]
fn within_failure_aborts_the_parent() {
    let group = describe("Root", |g| {
        g.within(
            "Guarded",
            |next| {
                next.run()?;
                fail("cleanup failed")
            },
            |g| {
                g.it("a", || Ok(()));
            },
        );
    })
    .unwrap();

    let err = group.run().unwrap_err();
    assert_eq!(err.to_string(), "Root, Guarded cleanup failed");
}

#[test]
fn descriptions_join_the_stack() {
    let seen = Arc::new(Mutex::new(None));
    let group = describe("Root", |g| {
        g.describe("Mid", |g| {
            let seen = Arc::clone(&seen);
            g.it("Leaf", move || {
                *seen.lock().unwrap() = RunContext::current().map(|ctx| ctx.description());
                Ok(())
            });
        });
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("Root, Mid, Leaf"));
    assert_eq!(report.outcomes[0].description, "Root, Mid, Leaf");
}

#[test]
fn loops_declare_examples_and_hooks_per_iteration() {
    let journal = Journal::new();
    let group = describe("For loop", |g| {
        g.each(1..=3, |g, _| {
            g.before_all(journal.step("before all"));
            g.it("iterates 1", journal.step("1"));
            g.it("iterates 2", journal.step("2"));
            g.after_all(journal.step("after all"));
        });
    })
    .unwrap();

    group.run().unwrap();
    assert_eq!(journal.count("before all"), 3);
    assert_eq!(journal.count("1"), 3);
    assert_eq!(journal.count("2"), 3);
    assert_eq!(journal.count("after all"), 3);
}

#[test]
fn nested_runs_still_complete() {
    let inner = Arc::new(
        describe("Inner", |g| {
            g.it("a", || Ok(()));
        })
        .unwrap(),
    );

    let group = describe("Outer", |g| {
        let inner = Arc::clone(&inner);
        g.it("runs another tree", move || {
            let report = inner.run()?;
            match report.passed() {
                1 => Ok(()),
                n => fail(format!("inner run passed {n}")),
            }
        });
    })
    .unwrap();

    let report = group.run().unwrap();
    assert_eq!(report.passed(), 1);
    assert_eq!(report.outcomes[0].description, "Outer, runs another tree");
}
