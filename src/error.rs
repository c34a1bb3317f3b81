use std::{
    borrow::Cow,
    error::Error,
    fmt::{self, Debug, Display},
};

/// What every example and hook callback returns.
pub type Outcome = Result<(), Signal>;

/// Why a callback did not finish normally.
///
/// Any [`std::error::Error`] converts into [`Signal::Failed`], so `?` works
/// inside callbacks. A skip is not a failure: it only stops the enclosing
/// scope and gets reported as skipped.
///
/// `Signal` must not implement [`Error`] itself, the blanket conversion
/// relies on it.
pub enum Signal {
    Skip { reason: Option<Cow<'static, str>> },
    Failed(Box<dyn Error + Send + Sync + 'static>),
}

impl Signal {
    pub fn skip() -> Self {
        Self::Skip { reason: None }
    }

    pub fn skip_because(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Skip {
            reason: Some(reason.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Failed(message.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }
}

impl<E> From<E> for Signal
where
    E: Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::Failed(Box::new(err))
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip { reason } => f.debug_struct("Skip").field("reason", reason).finish(),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip { reason: None } => write!(f, "skipped"),
            Self::Skip {
                reason: Some(reason),
            } => write!(f, "skipped: {reason}"),
            Self::Failed(err) => Display::fmt(err, f),
        }
    }
}

/// Skip the current scope.
pub fn skip() -> Outcome {
    Err(Signal::skip())
}

/// Skip the current scope, giving a reason.
pub fn skip_because(reason: impl Into<Cow<'static, str>>) -> Outcome {
    Err(Signal::skip_because(reason))
}

/// Fail the current scope with a plain message.
pub fn fail(message: impl Into<String>) -> Outcome {
    Err(Signal::failed(message))
}

/// A declaration sequence that cannot form a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    #[error("examples must not be empty")]
    EmptyGroup,

    #[error("group must have examples")]
    MissingExamples,

    #[error("before-all must precede before-each/around-each")]
    BeforeAllAfterBeforeEach,

    #[error("before hooks cannot appear after examples")]
    BeforeAllAfterExamples,

    #[error("before hooks cannot appear after examples")]
    BeforeEachAfterExamples,

    #[error("around-each cannot appear after examples")]
    AroundEachAfterExamples,

    #[error("after-each must precede after-all")]
    AfterEachAfterAfterAll,

    #[error("examples cannot appear after after hooks")]
    ExampleAfterAfterHooks,

    #[error("loop must end in example or after element")]
    LoopEndsBeforeExamples,

    #[error("conditional branches must end in the same phase")]
    MismatchedBranches,
}

/// A failure the runner could not recover from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RunError {
    /// A hook failed or panicked, aborting the rest of its group.
    #[error("{description} {message}")]
    Hook {
        description: String,
        message: String,
    },

    /// Examples failed; produced by [`RunReport::into_result`](crate::RunReport::into_result).
    #[error("{failed} example(s) failed, first: {first}")]
    Examples { failed: usize, first: String },
}

impl RunError {
    pub(crate) fn hook(description: String, message: String) -> Self {
        Self::Hook {
            description,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_port(raw: &str) -> Outcome {
        let port: u16 = raw.parse()?;
        assert!(port > 0);
        Ok(())
    }

    #[test]
    fn question_mark_converts_errors() {
        assert!(parse_port("8080").is_ok());

        let signal = parse_port("eighty").unwrap_err();
        assert!(!signal.is_skip());
        assert_eq!(signal.to_string(), "invalid digit found in string");
    }

    #[test]
    fn skip_display() {
        assert_eq!(Signal::skip().to_string(), "skipped");
        assert_eq!(
            skip_because("no network").unwrap_err().to_string(),
            "skipped: no network"
        );
    }

    #[test]
    fn hook_error_reads_like_a_sentence() {
        let err = RunError::hook("Root, before each: db".into(), "boom".into());
        assert_eq!(err.to_string(), "Root, before each: db boom");
    }
}
