//! Failure taxonomy for test outcomes.
//!
//! A [`Failure`] is the value a method body, hook, or harness phase
//! produces when it does not succeed. Unlike a plain error string it
//! carries a kind (so the controller can tell an assumption violation
//! from an assertion), an optional root cause, and a list of suppressed
//! failures appended by cleanup phases. Cleanup must run unconditionally,
//! and the original failure signal must never be lost, so cleanup errors
//! are suppressed into the primary failure rather than replacing it.

use serde::{Deserialize, Serialize};

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Ordinary assertion or body failure.
    Assertion,
    /// Violated assumption: the method's preconditions do not hold in
    /// this environment. Not a failure; reported as skipped, never
    /// wrapped, never counted toward cascading bookkeeping.
    Assumption,
    /// A before-suite hook failed. Fatal to the whole suite.
    SuiteSetup,
    /// An after-suite hook failed.
    SuiteTeardown,
    /// A bounded wait elapsed without the expected signal.
    Timeout,
    /// Collateral damage: an earlier failure in the same batch is the
    /// presumed root cause.
    Cascading,
    /// A tracked object outlived the point where it must be released.
    Leak,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assertion => write!(f, "assertion"),
            Self::Assumption => write!(f, "assumption"),
            Self::SuiteSetup => write!(f, "suite_setup"),
            Self::SuiteTeardown => write!(f, "suite_teardown"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cascading => write!(f, "cascading"),
            Self::Leak => write!(f, "leak"),
        }
    }
}

/// A structured test failure with cause chain and suppressed context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// Root cause, when this failure wraps another.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Failure>>,
    /// Failures from cleanup phases that ran after this failure was
    /// already the primary outcome. Never discarded, never primary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<Failure>,
}

impl Failure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            suppressed: Vec::new(),
        }
    }

    /// Ordinary assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Assertion, message)
    }

    /// Assumption violation. Short-circuits the method without counting
    /// as a failure.
    pub fn assumption(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Assumption, message)
    }

    /// Timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Leak-invariant violation listing the surviving objects.
    pub fn leak(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Leak, message)
    }

    /// Before-suite hook failure. The message records the batch kind
    /// because a batched suite's remaining methods are all suspect.
    pub fn suite_setup(batch: crate::types::BatchKind, cause: Failure) -> Self {
        let mut failure = Self::new(
            FailureKind::SuiteSetup,
            format!("before-suite hook failed in {batch} suite"),
        );
        failure.cause = Some(Box::new(cause));
        failure
    }

    /// After-suite hook failure.
    pub fn suite_teardown(cause: Failure) -> Self {
        let mut failure = Self::new(FailureKind::SuiteTeardown, "after-suite hook failed");
        failure.cause = Some(Box::new(cause));
        failure
    }

    /// Cascading wrapper: `original` is attached as suppressed context,
    /// not discarded, so the report shows both the wrapping note and the
    /// underlying failure.
    pub fn cascading(first_failed_method: &str, original: Failure) -> Self {
        let mut failure = Self::new(
            FailureKind::Cascading,
            format!(
                "likely collateral damage: \"{first_failed_method}\" failed earlier in this batch \
                 and may be the root cause"
            ),
        );
        failure.suppressed.push(original);
        failure
    }

    /// Attach a root cause.
    #[must_use]
    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Append a suppressed failure from a cleanup phase.
    pub fn suppress(&mut self, suppressed: Failure) {
        self.suppressed.push(suppressed);
    }

    /// Whether this is an assumption violation rather than a real failure.
    pub fn is_assumption(&self) -> bool {
        self.kind == FailureKind::Assumption
    }

    /// Convert a caught panic payload into an assertion failure, so
    /// `assert!` and `panic!` inside bodies and hooks surface as
    /// ordinary failures instead of aborting the run.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::assertion(format!("panicked: {message}"))
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        let mut cause = self.cause.as_deref();
        while let Some(inner) = cause {
            write!(f, "\n  caused by: [{}] {}", inner.kind, inner.message)?;
            cause = inner.cause.as_deref();
        }
        for suppressed in &self.suppressed {
            write!(f, "\n  suppressed: [{}] {}", suppressed.kind, suppressed.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

/// Fail a method body unless a precondition of the environment holds.
///
/// Expands to an early `return Err(Failure::assumption(..))`, which the
/// controller reports as skipped rather than failed.
#[macro_export]
macro_rules! assume {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err($crate::failure::Failure::assumption(format!($($msg)+)));
        }
    };
}
