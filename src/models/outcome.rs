use super::OutcomeKind;
use crate::error::{ExecutionError, ExecutionFailure};

/// Terminal result of one run. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failed(ExecutionFailure),
    Interrupted,
}

impl<T> Outcome<T> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::Failed(_) => OutcomeKind::Failed,
            Outcome::Interrupted => OutcomeKind::Interrupted,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Outcome::Interrupted)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        match self {
            Outcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failed(failure) => Outcome::Failed(failure),
            Outcome::Interrupted => Outcome::Interrupted,
        }
    }

    /// Convert into a `Result` for callers that only wait on the run.
    pub fn into_result(self) -> Result<T, ExecutionError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failed(failure) => Err(ExecutionError::Failed(failure)),
            Outcome::Interrupted => Err(ExecutionError::Interrupted),
        }
    }
}
