use super::latch::CompletionLatch;
use super::progress::AbortFlags;
use crate::dispatch::Dispatcher;
use crate::error::{ContractViolation, ExecutionFailure};
use crate::metrics::Metrics;
use crate::models::{Outcome, OutcomeKind, RunId, RunPhase};
use crate::state::EngineState;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Per-run state shared by every clone of a handle and by the worker
pub(crate) struct RunShared<T> {
    pub(crate) id: RunId,
    pub(crate) label: Option<String>,
    pub(crate) abortable: bool,
    pub(crate) flags: Arc<AbortFlags>,
    pub(crate) started: AtomicBool,
    pub(crate) latch: CompletionLatch<T>,
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    pub(crate) state: EngineState,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) runtime: tokio::runtime::Handle,
}

/// Caller-side view of one submitted run.
///
/// A handle lets the caller:
/// - wait for the outcome ([`wait`](Self::wait), [`wait_blocking`](Self::wait_blocking),
///   [`wait_timeout`](Self::wait_timeout)) or peek at it ([`outcome`](Self::outcome))
/// - register outcome handlers ([`on_success`](Self::on_success),
///   [`on_failed`](Self::on_failed), [`on_interrupted`](Self::on_interrupted),
///   [`on_complete`](Self::on_complete))
/// - ask the run to stop ([`request_abort`](Self::request_abort),
///   [`abort_after`](Self::abort_after))
///
/// The outcome is latched: every wait returns the same value and a handler
/// registered after completion still fires once. Handlers always run through
/// the engine's [`Dispatcher`], never on the worker.
///
/// Cloning is cheap; all clones refer to the same run.
pub struct ExecutionHandle<T> {
    inner: Arc<RunShared<T>>,
}

impl<T> Clone for ExecutionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ExecutionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("phase", &self.phase())
            .finish()
    }
}

impl<T> ExecutionHandle<T> {
    pub(crate) fn new(shared: RunShared<T>) -> Self {
        Self {
            inner: Arc::new(shared),
        }
    }

    pub fn id(&self) -> RunId {
        self.inner.id
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn is_abortable(&self) -> bool {
        self.inner.abortable
    }

    /// `Completed` only once the outcome is delivered, so it agrees with
    /// [`outcome`](Self::outcome) and [`is_finished`](Self::is_finished)
    pub fn phase(&self) -> RunPhase {
        match self.inner.latch.settled_kind() {
            Some(kind) => RunPhase::Completed(kind),
            None if self.inner.started.load(Ordering::SeqCst) => RunPhase::Running,
            None => RunPhase::Pending,
        }
    }

    /// Whether the outcome has been delivered
    pub fn is_finished(&self) -> bool {
        self.inner.latch.is_settled()
    }

    pub fn is_abort_requested(&self) -> bool {
        self.inner.flags.requested.load(Ordering::SeqCst)
    }

    /// Ask the operation to stop at its next progress report.
    ///
    /// Idempotent and safe at any time. Does nothing once the run has
    /// completed or when it was submitted as non-abortable.
    ///
    /// # Returns
    /// `true` if this call set the flag before the run completed
    pub fn request_abort(&self) -> bool {
        let inner = &self.inner;

        if !inner.abortable {
            tracing::debug!("Ignoring abort request for non-abortable {}", inner.id);
            return false;
        }

        if inner.latch.latched_kind().is_some() {
            tracing::debug!("Ignoring abort request for completed {}", inner.id);
            return false;
        }

        if inner.flags.requested.swap(true, Ordering::SeqCst) {
            return false;
        }

        // The worker cannot latch while this runs, so the event always
        // precedes `Completed`
        let recorded = inner.latch.while_pending(|| {
            tracing::info!("Abort requested for {}", inner.id);
            inner.metrics.record_abort_request();
            inner.state.record_abort(inner.id);
        });

        if recorded.is_none() {
            tracing::debug!("{} completed before the abort request landed", inner.id);
            return false;
        }
        true
    }

    pub(crate) fn mark_started(&self) {
        self.inner.started.store(true, Ordering::SeqCst);
    }
}

impl<T: Clone + Send + 'static> ExecutionHandle<T> {
    /// The outcome, if the run has already completed
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.inner.latch.peek()
    }

    /// Wait for the outcome without blocking the current thread
    pub async fn wait(&self) -> Outcome<T> {
        self.inner.latch.wait().await
    }

    /// Block the current thread until the outcome is available.
    ///
    /// Must not be called from an async task; use [`wait`](Self::wait) there.
    pub fn wait_blocking(&self) -> Outcome<T> {
        self.inner.latch.wait_blocking()
    }

    /// Block for at most `timeout`. Returns `None` if the run is still going.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        self.inner.latch.wait_timeout(timeout)
    }

    /// Request an abort once `delay` has elapsed, unless the run finishes
    /// first. The timer runs on the engine's tokio runtime.
    ///
    /// The returned task resolves to `true` if the timer fired and set the flag.
    pub fn abort_after(&self, delay: Duration) -> tokio::task::JoinHandle<bool> {
        let handle = self.clone();
        self.inner.runtime.spawn(async move {
            tokio::select! {
                _ = handle.inner.latch.wait() => false,
                _ = tokio::time::sleep(delay) => {
                    tracing::info!("{} deadline of {:?} elapsed", handle.inner.id, delay);
                    handle.request_abort()
                }
            }
        })
    }

    /// Run `handler` with whatever outcome the run produces
    pub fn on_complete<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.register(None, Box::new(handler));
        self
    }

    /// Run `handler` with the value if the run succeeds
    pub fn on_success<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.register(
            Some(OutcomeKind::Success),
            Box::new(move |outcome| {
                if let Outcome::Success(value) = outcome {
                    handler(value);
                }
            }),
        );
        self
    }

    /// Run `handler` with the failure if the operation fails
    pub fn on_failed<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(ExecutionFailure) + Send + 'static,
    {
        self.register(
            Some(OutcomeKind::Failed),
            Box::new(move |outcome| {
                if let Outcome::Failed(failure) = outcome {
                    handler(failure);
                }
            }),
        );
        self
    }

    /// Run `handler` if the run ends interrupted
    pub fn on_interrupted<F>(&self, handler: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(
            Some(OutcomeKind::Interrupted),
            Box::new(move |outcome| {
                if outcome.is_interrupted() {
                    handler();
                }
            }),
        );
        self
    }

    fn register(
        &self,
        kind: Option<OutcomeKind>,
        handler: Box<dyn FnOnce(Outcome<T>) + Send + 'static>,
    ) {
        self.inner
            .latch
            .register(kind, handler, self.inner.dispatcher.as_ref());
    }

    /// Latch and deliver the outcome. A second call is a contract violation:
    /// it is logged and counted, never delivered.
    pub(crate) fn finish(&self, outcome: Outcome<T>, elapsed: Duration) {
        let inner = &self.inner;
        let attempted = outcome.kind();

        let delivery = match inner.latch.latch(outcome) {
            Ok(delivery) => delivery,
            Err(latched) => {
                let violation = ContractViolation {
                    run: inner.id,
                    latched,
                    attempted,
                };
                inner.metrics.record_contract_violation();
                tracing::error!("Contract violation: {}", violation);
                return;
            }
        };

        inner.metrics.record_completion(attempted, elapsed);
        inner.state.complete(inner.id, attempted, elapsed);

        match delivery.outcome() {
            Outcome::Failed(failure) => tracing::warn!(
                "{} failed after {:.2}s: {:#}",
                inner.id,
                elapsed.as_secs_f32(),
                failure.cause()
            ),
            _ => tracing::info!(
                "{} completed as {} in {:.2}s",
                inner.id,
                attempted,
                elapsed.as_secs_f32()
            ),
        }

        inner
            .latch
            .deliver(delivery, inner.dispatcher.as_ref(), inner.id);
    }
}
