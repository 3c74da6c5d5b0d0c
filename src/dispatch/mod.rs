//! Dispatch module - delivering work back onto the caller's context.
//!
//! Outcome handlers and progress listeners must never run on the background
//! worker. Instead the engine hands them, boxed as a [`Job`], to a
//! [`Dispatcher`] supplied by whoever owns the calling context.
//!
//! # Components
//!
//! - [`Dispatcher`]: the seam. Implemented by [`EventLoopHandle`] and by any
//!   `Fn(Job) + Send + Sync` closure, so a UI toolkit's own
//!   "invoke on the event loop" hook can be plugged in directly:
//!
//! ```ignore
//! let dispatcher = move |job: opexec::Job| {
//!     let _ = slint::invoke_from_event_loop(job);
//! };
//! let engine = ExecutionEngine::new(dispatcher, runtime.handle().clone());
//! ```
//!
//! - [`EventLoop`]: a channel-backed job queue for callers that do not have
//!   an event loop of their own. The caller drains it on its own thread.
//!
//! # Ordering
//!
//! Jobs from one run are dispatched in the order they were produced: every
//! progress notification of a run is handed over before its outcome
//! handlers. Dispatchers are expected to preserve FIFO order.

pub mod event_loop;

pub use event_loop::{EventLoop, EventLoopHandle};

/// A unit of work to run on the caller's context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Delivers jobs to the context that owns a run.
#[cfg_attr(test, mockall::automock)]
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

impl<F> Dispatcher for F
where
    F: Fn(Job) + Send + Sync,
{
    fn dispatch(&self, job: Job) {
        self(job)
    }
}
