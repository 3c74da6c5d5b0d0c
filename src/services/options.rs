use super::progress::ProgressListener;
use crate::error::ExecutionFailure;
use crate::models::{ContextResources, ProgressUpdate};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type FailedHandler = Box<dyn FnOnce(ExecutionFailure) + Send + 'static>;
pub type InterruptedHandler = Box<dyn FnOnce() + Send + 'static>;

/// Per-run configuration passed to
/// [`ExecutionEngine::submit_with`](super::ExecutionEngine::submit_with).
///
/// Plain named fields; start from [`ExecutionEngine::options`](super::ExecutionEngine::options)
/// to pick up the engine's configured defaults, or from `RunOptions::default()`.
///
/// ```ignore
/// let mut options = engine.options();
/// options.label = Some("export".into());
/// options.resources.insert("target", target_dir);
/// options.on_failed = Some(Box::new(|failure| show_error(&failure)));
/// let run = engine.submit_with(export, options);
/// ```
pub struct RunOptions {
    /// Whether `request_abort` has any effect on this run
    pub abortable: bool,

    /// Name used in logs and run events
    pub label: Option<String>,

    /// Request an abort automatically after this long. Ignored when the run
    /// is not abortable.
    pub abort_after: Option<Duration>,

    /// Caller state made visible to the operation
    pub resources: ContextResources,

    /// Called on the caller's context for every progress report
    pub on_progress: Option<ProgressListener>,

    /// Called on the caller's context if the run fails
    pub on_failed: Option<FailedHandler>,

    /// Called on the caller's context if the run ends interrupted
    pub on_interrupted: Option<InterruptedHandler>,
}

impl RunOptions {
    /// Convenience for setting `on_progress` from a closure
    pub fn with_progress<F>(mut self, listener: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(listener));
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            abortable: true,
            label: None,
            abort_after: None,
            resources: ContextResources::new(),
            on_progress: None,
            on_failed: None,
            on_interrupted: None,
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("abortable", &self.abortable)
            .field("label", &self.label)
            .field("abort_after", &self.abort_after)
            .field("resources", &self.resources)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .field("on_interrupted", &self.on_interrupted.is_some())
            .finish()
    }
}
