use super::ProgressCallback;
use crate::error::OperationError;

/// A unit of work the engine runs on a background worker.
///
/// Implementations should call [`ProgressCallback::report`] before starting,
/// after each logical step, and on completion, with cumulative counts. When
/// a report answers [`Abort`](crate::models::ProgressSignal::Abort) the
/// operation should stop as soon as practical and return
/// [`OperationError::Interrupted`].
///
/// An operation holds no per-run state of its own: every call to
/// [`execute`](Self::execute) is an independent run. Side effects are the
/// operation's business; the engine never retries it.
///
/// Closures taking `&ProgressCallback` are operations:
///
/// ```ignore
/// let run = engine.submit(|progress: &ProgressCallback| {
///     for step in 0..10 {
///         if progress.report(10, step).is_abort() {
///             return Err(OperationError::Interrupted);
///         }
///         do_step(step)?;
///     }
///     progress.report(10, 10);
///     Ok(())
/// });
/// ```
pub trait Operation<T>: Send + Sync {
    fn execute(&self, progress: &ProgressCallback) -> Result<T, OperationError>;
}

impl<T, F> Operation<T> for F
where
    F: Fn(&ProgressCallback) -> Result<T, OperationError> + Send + Sync,
{
    fn execute(&self, progress: &ProgressCallback) -> Result<T, OperationError> {
        self(progress)
    }
}
