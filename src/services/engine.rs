use super::handle::{ExecutionHandle, RunShared};
use super::latch::CompletionLatch;
use super::operation::Operation;
use super::options::RunOptions;
use super::progress::{AbortFlags, ProgressCallback, ProgressWiring};
use crate::dispatch::Dispatcher;
use crate::error::{ExecutionFailure, OperationError};
use crate::metrics::Metrics;
use crate::models::{EngineSettings, Outcome, RunId, SettingsError};
use crate::state::{EngineState, RunEvent};
use anyhow::anyhow;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

/// Runs operations on background workers and delivers their outcomes back
/// to the caller's context.
///
/// Each submission gets its own dedicated worker thread and its own
/// [`ExecutionHandle`]. Progress notifications and outcome handlers are
/// handed to the engine's [`Dispatcher`], in order, so they run wherever
/// the caller's context lives (an [`EventLoop`](crate::dispatch::EventLoop),
/// a UI toolkit's event loop, ...).
///
/// The tokio runtime handle is used for caller-side timers such as
/// [`ExecutionHandle::abort_after`]; operations themselves never run on it.
///
/// # Example
/// ```ignore
/// let (dispatcher, mut event_loop) = EventLoop::channel();
/// let engine = ExecutionEngine::new(dispatcher, Handle::current());
///
/// let run = engine.submit(|progress: &ProgressCallback| {
///     progress.report(0, 0);
///     Ok("done")
/// });
/// run.on_success(|value| println!("{value}"));
///
/// event_loop.run_until(run.wait()).await;
/// ```
pub struct ExecutionEngine {
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Handle,
    settings: EngineSettings,
    state: EngineState,
    metrics: Arc<Metrics>,
    next_run: AtomicU64,
}

impl ExecutionEngine {
    /// Create an engine with default settings
    pub fn new<D>(dispatcher: D, runtime: Handle) -> Self
    where
        D: Dispatcher + 'static,
    {
        Self::build(Arc::new(dispatcher), runtime, EngineSettings::default())
    }

    /// Create an engine with explicit settings, rejecting invalid ones
    pub fn with_settings<D>(
        dispatcher: D,
        runtime: Handle,
        settings: EngineSettings,
    ) -> Result<Self, SettingsError>
    where
        D: Dispatcher + 'static,
    {
        settings.validate()?;
        Ok(Self::build(Arc::new(dispatcher), runtime, settings))
    }

    fn build(dispatcher: Arc<dyn Dispatcher>, runtime: Handle, settings: EngineSettings) -> Self {
        tracing::info!(
            "Execution engine initialized: worker_prefix={}, default_abortable={}, default_abort_after={:?}",
            settings.worker_name_prefix,
            settings.default_abortable,
            settings.default_abort_after()
        );

        Self {
            dispatcher,
            runtime,
            state: EngineState::new(settings.event_capacity),
            settings,
            metrics: Arc::new(Metrics::new()),
            next_run: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Registry of active runs
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Subscribe to lifecycle events of every run
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.state.subscribe()
    }

    /// Run options pre-filled with this engine's configured defaults
    pub fn options(&self) -> RunOptions {
        RunOptions {
            abortable: self.settings.default_abortable,
            abort_after: self.settings.default_abort_after(),
            ..RunOptions::default()
        }
    }

    /// Start `operation` on a background worker with default options.
    /// Returns immediately.
    pub fn submit<T, O>(&self, operation: O) -> ExecutionHandle<T>
    where
        T: Clone + Send + 'static,
        O: Operation<T> + 'static,
    {
        self.submit_with(operation, self.options())
    }

    /// Start `operation` on a background worker with the given options.
    /// Returns immediately.
    pub fn submit_with<T, O>(&self, operation: O, options: RunOptions) -> ExecutionHandle<T>
    where
        T: Clone + Send + 'static,
        O: Operation<T> + 'static,
    {
        self.submit_shared(Arc::new(operation), options)
    }

    /// Start a run of a shared operation. The same operation may be
    /// submitted any number of times; every submission is an independent run.
    pub fn submit_shared<T>(
        &self,
        operation: Arc<dyn Operation<T>>,
        options: RunOptions,
    ) -> ExecutionHandle<T>
    where
        T: Clone + Send + 'static,
    {
        let RunOptions {
            abortable,
            label,
            abort_after,
            resources,
            on_progress,
            on_failed,
            on_interrupted,
        } = options;

        let id = RunId::new(self.next_run.fetch_add(1, Ordering::Relaxed) + 1);
        let flags = Arc::new(AbortFlags::default());

        let handle = ExecutionHandle::new(RunShared {
            id,
            label: label.clone(),
            abortable,
            flags: Arc::clone(&flags),
            started: AtomicBool::new(false),
            latch: CompletionLatch::new(),
            dispatcher: Arc::clone(&self.dispatcher),
            state: self.state.clone(),
            metrics: Arc::clone(&self.metrics),
            runtime: self.runtime.clone(),
        });

        // Handlers from the options must be in place before the worker can finish
        if let Some(handler) = on_failed {
            handle.on_failed(handler);
        }
        if let Some(handler) = on_interrupted {
            handle.on_interrupted(handler);
        }

        self.metrics.record_submitted();
        self.state.register(id, label.clone());
        match &label {
            Some(label) => tracing::info!("Submitting {} ({})", id, label),
            None => tracing::info!("Submitting {}", id),
        }

        let progress = ProgressCallback::new(
            id,
            flags,
            resources,
            on_progress,
            ProgressWiring {
                dispatcher: Arc::clone(&self.dispatcher),
                state: self.state.clone(),
                metrics: Arc::clone(&self.metrics),
                trace_reports: self.settings.log_progress,
            },
        );

        let worker = handle.clone();
        let metrics = Arc::clone(&self.metrics);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.settings.worker_name_prefix, id.get()))
            .spawn(move || run_worker(worker, operation, progress, metrics));

        if let Err(err) = spawned {
            fail_unspawned(&handle, err);
            return handle;
        }

        if let Some(delay) = abort_after {
            if abortable {
                // Detached; the timer stops on its own once the run completes
                drop(handle.abort_after(delay));
            } else {
                tracing::debug!("Ignoring deadline of {:?} for non-abortable {}", delay, id);
            }
        }

        handle
    }

    /// Ask a run to stop. See [`ExecutionHandle::request_abort`].
    pub fn request_abort<T>(&self, handle: &ExecutionHandle<T>) -> bool {
        handle.request_abort()
    }

    /// Wait for a run's latched outcome
    pub async fn wait<T>(&self, handle: &ExecutionHandle<T>) -> Outcome<T>
    where
        T: Clone + Send + 'static,
    {
        handle.wait().await
    }

    pub fn on_complete<T, F>(&self, handle: &ExecutionHandle<T>, handler: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        handle.on_complete(handler);
    }

    pub fn on_success<T, F>(&self, handle: &ExecutionHandle<T>, handler: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        handle.on_success(handler);
    }

    pub fn on_failed<T, F>(&self, handle: &ExecutionHandle<T>, handler: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(ExecutionFailure) + Send + 'static,
    {
        handle.on_failed(handler);
    }

    pub fn on_interrupted<T, F>(&self, handle: &ExecutionHandle<T>, handler: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        handle.on_interrupted(handler);
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("settings", &self.settings)
            .field("active_runs", &self.state.active_count())
            .finish()
    }
}

/// Latch `Failed` for a run whose worker thread never started
fn fail_unspawned<T>(handle: &ExecutionHandle<T>, err: io::Error)
where
    T: Clone + Send + 'static,
{
    let id = handle.id();
    tracing::error!("Failed to spawn worker for {}: {}", id, err);
    let cause = anyhow::Error::new(err).context(format!("failed to spawn worker for {id}"));
    handle.finish(Outcome::Failed(ExecutionFailure::new(cause)), Duration::ZERO);
}

/// Body of a worker thread: run the operation once, classify, latch.
fn run_worker<T>(
    handle: ExecutionHandle<T>,
    operation: Arc<dyn Operation<T>>,
    progress: ProgressCallback,
    metrics: Arc<Metrics>,
) where
    T: Clone + Send + 'static,
{
    handle.mark_started();
    let started = Instant::now();
    tracing::debug!(
        "{} running on thread {}",
        handle.id(),
        thread::current().name().unwrap_or("<unnamed>")
    );

    let result = panic::catch_unwind(AssertUnwindSafe(|| operation.execute(&progress)));
    if result.is_err() {
        metrics.record_panic();
    }

    let outcome = classify(handle.id(), result, progress.abort_observed());
    handle.finish(outcome, started.elapsed());
}

/// Map what the operation did to the run's outcome.
///
/// Precedence: a panic is always `Failed`; otherwise an observed abort makes
/// the run `Interrupted` however the operation returned; otherwise the
/// operation's own result decides.
pub(crate) fn classify<T>(
    run: RunId,
    result: thread::Result<Result<T, OperationError>>,
    abort_observed: bool,
) -> Outcome<T> {
    match result {
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!("{} panicked: {}", run, message);
            Outcome::Failed(ExecutionFailure::new(anyhow!(
                "operation panicked: {message}"
            )))
        }
        Ok(result) if abort_observed => {
            match result {
                Ok(_) => tracing::debug!("{} returned a value after abort; discarding it", run),
                Err(OperationError::Failed(cause)) => {
                    tracing::debug!("{} failed after abort: {:#}", run, cause)
                }
                Err(OperationError::Interrupted) => {}
            }
            Outcome::Interrupted
        }
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(OperationError::Interrupted)) => Outcome::Interrupted,
        Ok(Err(OperationError::Failed(cause))) => Outcome::Failed(ExecutionFailure::new(cause)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Job, MockDispatcher};
    use crate::models::{OutcomeKind, RunPhase};
    use std::sync::Mutex;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn inline_engine(runtime: &tokio::runtime::Runtime) -> ExecutionEngine {
        ExecutionEngine::new(|job: Job| job(), runtime.handle().clone())
    }

    #[test]
    fn test_classify_success() {
        let outcome = classify(RunId::new(1), Ok(Ok(7u32)), false);
        assert_eq!(outcome, Outcome::Success(7));
    }

    #[test]
    fn test_classify_interrupted_error() {
        let outcome: Outcome<u32> =
            classify(RunId::new(1), Ok(Err(OperationError::Interrupted)), false);
        assert_eq!(outcome, Outcome::Interrupted);
    }

    #[test]
    fn test_classify_failure_keeps_cause() {
        let outcome: Outcome<u32> = classify(
            RunId::new(1),
            Ok(Err(OperationError::msg("disk full"))),
            false,
        );
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.cause().to_string(), "disk full");
    }

    #[test]
    fn test_classify_observed_abort_wins_over_result() {
        let ok = classify(RunId::new(1), Ok(Ok(1u32)), true);
        let failed: Outcome<u32> =
            classify(RunId::new(1), Ok(Err(OperationError::msg("late"))), true);

        assert_eq!(ok, Outcome::Interrupted);
        assert_eq!(failed, Outcome::Interrupted);
    }

    #[test]
    fn test_classify_panic_is_failed() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let outcome: Outcome<u32> = classify(RunId::new(1), Err(payload), true);

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.cause().to_string(), "operation panicked: boom");
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }

    #[test]
    fn test_with_settings_rejects_invalid() {
        let rt = runtime();
        let settings = EngineSettings {
            worker_name_prefix: String::new(),
            ..EngineSettings::default()
        };

        let result = ExecutionEngine::with_settings(|job: Job| job(), rt.handle().clone(), settings);
        assert_eq!(result.err(), Some(SettingsError::EmptyWorkerPrefix));
    }

    #[test]
    fn test_with_settings_rejects_nul_prefix() {
        let rt = runtime();
        let settings = EngineSettings {
            worker_name_prefix: "bad\0prefix".to_string(),
            ..EngineSettings::default()
        };

        let result = ExecutionEngine::with_settings(|job: Job| job(), rt.handle().clone(), settings);
        assert_eq!(result.err(), Some(SettingsError::NulInWorkerPrefix));
    }

    #[test]
    fn test_spawn_failure_latches_failed() {
        let rt = runtime();
        let engine = inline_engine(&rt);
        let id = RunId::new(42);
        let handle: ExecutionHandle<u32> = ExecutionHandle::new(RunShared {
            id,
            label: None,
            abortable: true,
            flags: Arc::new(AbortFlags::default()),
            started: AtomicBool::new(false),
            latch: CompletionLatch::new(),
            dispatcher: Arc::clone(&engine.dispatcher),
            state: engine.state.clone(),
            metrics: Arc::clone(&engine.metrics),
            runtime: rt.handle().clone(),
        });
        engine.state.register(id, None);

        let failures = Arc::new(Mutex::new(Vec::new()));
        let failures_clone = Arc::clone(&failures);
        handle.on_failed(move |failure| failures_clone.lock().unwrap().push(failure));

        fail_unspawned(
            &handle,
            io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"),
        );

        let failure = handle.outcome().and_then(|outcome| outcome.failure().cloned()).unwrap();
        let message = format!("{:#}", failure.cause());
        assert!(message.contains("failed to spawn worker for"), "{message}");
        assert!(message.contains("thread limit reached"), "{message}");
        assert!(failure.downcast_ref::<io::Error>().is_some());

        assert_eq!(*failures.lock().unwrap(), vec![failure]);
        assert_eq!(handle.phase(), RunPhase::Completed(OutcomeKind::Failed));
        assert_eq!(engine.metrics().runs_failed.load(Ordering::Relaxed), 1);
        assert_eq!(engine.state().active_count(), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_hang_waiters() {
        let rt = runtime();
        let engine = inline_engine(&rt);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let run = engine.submit(move |_: &ProgressCallback| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(1u32)
        });
        // Registered before completion, so it runs inline on the worker
        run.on_success(|_| panic!("handler bug"));
        release_tx.send(()).unwrap();

        assert_eq!(
            run.wait_timeout(Duration::from_secs(5)),
            Some(Outcome::Success(1))
        );
        assert!(run.is_finished());
        assert_eq!(run.phase(), RunPhase::Completed(OutcomeKind::Success));
    }

    #[test]
    fn test_run_ids_increase() {
        let rt = runtime();
        let engine = inline_engine(&rt);

        let first = engine.submit(|_: &ProgressCallback| Ok(()));
        let second = engine.submit(|_: &ProgressCallback| Ok(()));

        assert_eq!(first.id(), RunId::new(1));
        assert_eq!(second.id(), RunId::new(2));
        first.wait_blocking();
        second.wait_blocking();
    }

    #[test]
    fn test_worker_thread_is_named() {
        let rt = runtime();
        let settings = EngineSettings {
            worker_name_prefix: "unit".to_string(),
            ..EngineSettings::default()
        };
        let engine =
            ExecutionEngine::with_settings(|job: Job| job(), rt.handle().clone(), settings).unwrap();

        let run = engine.submit(|_: &ProgressCallback| {
            Ok(thread::current().name().map(str::to_string))
        });

        assert_eq!(run.wait_blocking(), Outcome::Success(Some("unit-1".to_string())));
    }

    #[test]
    fn test_outcome_handler_dispatched_once() {
        let rt = runtime();
        let mut mock = MockDispatcher::new();
        mock.expect_dispatch().times(1).returning(|job| job());
        let engine = ExecutionEngine::new(mock, rt.handle().clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let run = engine.submit(|_: &ProgressCallback| Ok(3u32));
        engine.on_complete(&run, move |outcome| {
            seen_clone.lock().unwrap().push(outcome);
        });

        assert_eq!(run.wait_blocking(), Outcome::Success(3));
        assert_eq!(*seen.lock().unwrap(), vec![Outcome::Success(3)]);
    }

    #[test]
    fn test_non_abortable_ignores_requests() {
        let rt = runtime();
        let engine = inline_engine(&rt);
        let options = RunOptions {
            abortable: false,
            ..engine.options()
        };

        let run = engine.submit_with(
            |progress: &ProgressCallback| {
                thread::sleep(Duration::from_millis(20));
                Ok(progress.report(1, 1))
            },
            options,
        );

        assert!(!engine.request_abort(&run));
        assert!(!run.is_abort_requested());
        assert_eq!(
            run.wait_blocking(),
            Outcome::Success(crate::models::ProgressSignal::Proceed)
        );
    }

    #[test]
    fn test_abort_request_counted_once() {
        let rt = runtime();
        let engine = inline_engine(&rt);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let run = engine.submit(move |progress: &ProgressCallback| {
            let _ = release_rx.lock().unwrap().recv();
            if progress.report(1, 0).is_abort() {
                return Err(OperationError::Interrupted);
            }
            Ok(())
        });

        assert!(engine.request_abort(&run));
        assert!(!engine.request_abort(&run));
        release_tx.send(()).unwrap();

        assert_eq!(run.wait_blocking(), Outcome::Interrupted);
        assert_eq!(engine.metrics().abort_requests.load(Ordering::Relaxed), 1);
        assert_eq!(run.phase(), RunPhase::Completed(OutcomeKind::Interrupted));
        // No-op after completion
        assert!(!engine.request_abort(&run));
    }

    #[test]
    fn test_second_finish_is_contract_violation() {
        let rt = runtime();
        let engine = inline_engine(&rt);
        let run = engine.submit(|_: &ProgressCallback| Ok(1u32));
        assert_eq!(run.wait_blocking(), Outcome::Success(1));

        run.finish(Outcome::Interrupted, Duration::ZERO);

        assert_eq!(run.outcome(), Some(Outcome::Success(1)));
        assert_eq!(
            engine.metrics().contract_violations.load(Ordering::Relaxed),
            1
        );
        assert_eq!(engine.metrics().completed_runs(), 1);
    }
}
