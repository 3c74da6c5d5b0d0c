// Error taxonomy for background runs
//
// Operations report failure through `OperationError`; callers receive
// `ExecutionError` from a latched outcome. The two variants are kept apart so
// a cancelled run can be presented differently from a failed one.

use crate::models::{OutcomeKind, RunId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by an [`Operation`](crate::services::Operation) body.
#[derive(Error, Debug)]
pub enum OperationError {
    /// The operation stopped because the progress callback returned
    /// [`ProgressSignal::Abort`](crate::models::ProgressSignal::Abort).
    #[error("operation was interrupted")]
    Interrupted,

    /// Any other failure. The original cause is preserved.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl OperationError {
    /// Wrap an arbitrary error as a failure.
    pub fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::new(error))
    }

    /// Build a failure from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::msg(message))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<std::io::Error> for OperationError {
    fn from(error: std::io::Error) -> Self {
        Self::Failed(error.into())
    }
}

/// A failed run's cause.
///
/// Cheap to clone so the same latched outcome can be handed to every waiter
/// and handler. Two values compare equal only when they share the same cause.
#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    cause: Arc<anyhow::Error>,
}

impl ExecutionFailure {
    pub fn new(cause: anyhow::Error) -> Self {
        Self {
            cause: Arc::new(cause),
        }
    }

    /// The error the operation raised (or the panic message it died with).
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Downcast the original cause to a concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.cause.downcast_ref::<E>()
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation failed: {}", self.cause)
    }
}

impl std::error::Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let cause: &(dyn std::error::Error + Send + Sync + 'static) = (*self.cause).as_ref();
        Some(cause)
    }
}

impl PartialEq for ExecutionFailure {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }
}

/// Terminal error of a run, as seen by a caller that waited on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error(transparent)]
    Failed(#[from] ExecutionFailure),

    #[error("operation was interrupted by an abort request")]
    Interrupted,
}

/// A second completion attempt on a run that already latched its outcome.
///
/// Never delivered to handlers; only logged and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{run} already completed as {latched}; ignoring second completion as {attempted}")]
pub struct ContractViolation {
    pub run: RunId,
    pub latched: OutcomeKind,
    pub attempted: OutcomeKind,
}
