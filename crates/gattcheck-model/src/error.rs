use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Failure taxonomy for a conformance session.
///
/// The three variants have distinct retry semantics: a [`Rejected`] command
/// was refused synchronously and is never retried; a [`Timeout`] is retried
/// only for the start commands wrapped in a retry policy; an [`Assertion`]
/// signals a real protocol defect and is always fatal.
///
/// [`Rejected`]: HarnessError::Rejected
/// [`Timeout`]: HarnessError::Timeout
/// [`Assertion`]: HarnessError::Assertion
#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    #[error("command '{action}' rejected by device: {reason}")]
    Rejected { action: String, reason: String },

    #[error("timed out after {attempts} attempt(s) of {window:?} waiting for '{waiting_for}'")]
    Timeout {
        waiting_for: String,
        window: Duration,
        attempts: u32,
    },

    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl HarnessError {
    #[must_use]
    pub fn rejected(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            action: action.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn timeout(waiting_for: impl Into<String>, window: Duration) -> Self {
        Self::Timeout {
            waiting_for: waiting_for.into(),
            window,
            attempts: 1,
        }
    }

    #[must_use]
    pub fn assertion(detail: impl Into<String>) -> Self {
        Self::Assertion(detail.into())
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Assertion(_))
    }
}
