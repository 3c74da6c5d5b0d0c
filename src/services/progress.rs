use crate::dispatch::Dispatcher;
use crate::metrics::Metrics;
use crate::models::{ContextResources, ProgressSignal, ProgressUpdate, RunId};
use crate::state::EngineState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Listener for progress updates, invoked on the caller's context.
pub type ProgressListener = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Cancellation state shared between a run's handle and its callback.
#[derive(Debug, Default)]
pub(crate) struct AbortFlags {
    /// Set by `request_abort`
    pub(crate) requested: AtomicBool,
    /// Set the first time the callback returned `Abort`
    pub(crate) observed: AtomicBool,
}

/// Engine plumbing a callback reports into.
pub(crate) struct ProgressWiring {
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    pub(crate) state: EngineState,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) trace_reports: bool,
}

/// Handed to an operation so it can report progress and learn whether the
/// caller wants it to stop.
///
/// Every [`report`](Self::report) checks the run's cancellation flag. Once the
/// flag is set the callback answers [`ProgressSignal::Abort`] and remembers
/// that the operation has seen the request, which decides how the run is
/// classified when the operation returns.
///
/// Cloning is cheap; clones report into the same run.
#[derive(Clone)]
pub struct ProgressCallback {
    inner: Arc<CallbackInner>,
}

struct CallbackInner {
    run: RunId,
    flags: Arc<AbortFlags>,
    resources: ContextResources,
    listener: Option<ProgressListener>,
    wiring: ProgressWiring,
    high_water: AtomicU64,
}

impl ProgressCallback {
    pub(crate) fn new(
        run: RunId,
        flags: Arc<AbortFlags>,
        resources: ContextResources,
        listener: Option<ProgressListener>,
        wiring: ProgressWiring,
    ) -> Self {
        Self {
            inner: Arc::new(CallbackInner {
                run,
                flags,
                resources,
                listener,
                wiring,
                high_water: AtomicU64::new(0),
            }),
        }
    }

    /// Report cumulative progress and get told whether to continue.
    ///
    /// `total_steps == 0` marks the run as indeterminate; `report(0, 0)` is a
    /// plain cancellation check.
    pub fn report(&self, total_steps: u64, completed_steps: u64) -> ProgressSignal {
        let inner = &self.inner;
        inner.wiring.metrics.record_progress_report();

        let previous = inner.high_water.fetch_max(completed_steps, Ordering::AcqRel);
        if completed_steps < previous {
            tracing::warn!(
                "{} reported progress going backwards: {} after {}",
                inner.run,
                completed_steps,
                previous
            );
        }

        if inner.wiring.trace_reports {
            tracing::trace!("{} progress {}/{}", inner.run, completed_steps, total_steps);
        }

        inner
            .wiring
            .state
            .record_progress(inner.run, total_steps, completed_steps);

        if let Some(listener) = &inner.listener {
            let listener = Arc::clone(listener);
            let update = ProgressUpdate {
                run: inner.run,
                total: total_steps,
                completed: completed_steps,
            };
            inner
                .wiring
                .dispatcher
                .dispatch(Box::new(move || listener(update)));
        }

        if inner.flags.requested.load(Ordering::SeqCst) {
            if !inner.flags.observed.swap(true, Ordering::SeqCst) {
                tracing::debug!("{} observed abort request", inner.run);
            }
            return ProgressSignal::Abort;
        }

        ProgressSignal::Proceed
    }

    /// Resources the caller attached to this run.
    pub fn resources(&self) -> &ContextResources {
        &self.inner.resources
    }

    pub fn run_id(&self) -> RunId {
        self.inner.run
    }

    /// Whether this callback has already answered `Abort`.
    pub fn abort_observed(&self) -> bool {
        self.inner.flags.observed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCallback")
            .field("run", &self.inner.run)
            .field("abort_observed", &self.abort_observed())
            .finish()
    }
}
