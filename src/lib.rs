//! Nested `describe`/`it` groups with ordered hooks, focus and exclusion
//! tags, and concurrently running siblings.
//!
//! Trees are declared with [`describe`] (or [`describe_async`]), which checks
//! the order of every declaration while the closure runs, and executed with
//! a [`Runner`].
//!
//! ```
//! use specwalk::prelude::*;
//!
//! let group = describe("Parser", |g| {
//!     g.before_all(|| Ok(()));
//!     g.it("reads numbers", || {
//!         let n: u32 = "42".parse()?;
//!         assert_eq!(n, 42);
//!         Ok(())
//!     });
//!     g.describe("with bad input", |g| {
//!         g.it("rejects letters", || match "x".parse::<u32>() {
//!             Ok(_) => fail("parsed a letter"),
//!             Err(_) => Ok(()),
//!         });
//!     })
//!     .concurrent();
//! })
//! .unwrap();
//!
//! let report = group.run().unwrap().into_result().unwrap();
//! assert_eq!(report.passed(), 2);
//! ```

pub mod builder;
pub mod context;
pub mod element;
pub mod error;
pub mod filter;
pub mod mode;
pub mod outcome;
pub mod reporter;

mod panic;

mod report;
pub use report::*;

mod runner;
pub use runner::*;

pub use builder::{describe, describe_async};
pub use element::{Element, Tag};
pub use error::{Outcome, RunError, Signal, StructureError};
pub use mode::{Async, Blocking};

#[cfg(test)]
mod test_support;

pub mod prelude {
    pub use crate::{
        Runner,
        builder::{Builder, describe, describe_async},
        element::{Element, Group, Tag},
        error::{Outcome, RunError, Signal, StructureError, fail, skip, skip_because},
        mode::{Async, AsyncNext, Blocking, Next},
        report::RunReport,
        reporter::Reporter,
    };
}
