//! Services module - running operations off the caller's context.
//!
//! This module holds the execution core: the engine that starts operations
//! on background workers, the callback they report progress through, and the
//! handle the caller uses to wait, register handlers, or ask a run to stop.
//! Nothing here knows about any particular UI toolkit; results reach the
//! caller through a [`Dispatcher`](crate::dispatch::Dispatcher).
//!
//! # Components
//!
//! - [`ExecutionEngine`]: Accepts [`Operation`]s and runs each on its own
//!   worker thread. Handles:
//!   - Cooperative cancellation through a per-run flag
//!   - Classifying what the operation did into exactly one [`Outcome`](crate::models::Outcome)
//!   - Catching panics at the worker boundary
//!   - Marshaling progress and outcome handlers back to the caller
//!
//! - [`ExecutionHandle`]: The caller's view of one run. Latched outcome,
//!   handler registration, abort requests, deadlines.
//!
//! - [`ProgressCallback`]: Passed to the operation. Every
//!   [`report`](ProgressCallback::report) answers
//!   [`Proceed`](crate::models::ProgressSignal::Proceed) or
//!   [`Abort`](crate::models::ProgressSignal::Abort).
//!
//! - [`RunOptions`]: Named per-run settings (abortable flag, label,
//!   deadline, context resources, handlers).
//!
//! # Outcome classification
//!
//! | Operation did                                   | Outcome       |
//! |-------------------------------------------------|---------------|
//! | panicked                                        | `Failed`      |
//! | anything after its callback answered `Abort`    | `Interrupted` |
//! | returned `Ok(value)`                            | `Success`     |
//! | returned `Err(OperationError::Interrupted)`     | `Interrupted` |
//! | returned any other error                        | `Failed`      |
//!
//! # Usage Example
//!
//! ```ignore
//! use opexec::{EventLoop, ExecutionEngine, OperationError, ProgressCallback};
//!
//! let (dispatcher, mut event_loop) = EventLoop::channel();
//! let engine = ExecutionEngine::new(dispatcher, tokio::runtime::Handle::current());
//!
//! let run = engine.submit(|progress: &ProgressCallback| {
//!     for step in 0..3 {
//!         if progress.report(3, step).is_abort() {
//!             return Err(OperationError::Interrupted);
//!         }
//!     }
//!     progress.report(3, 3);
//!     Ok("DONE")
//! });
//!
//! run.on_success(|value| println!("finished: {value}"))
//!     .on_interrupted(|| println!("cancelled"));
//!
//! let outcome = event_loop.run_until(run.wait()).await;
//! ```

pub mod engine;
pub mod handle;
mod latch;
pub mod operation;
pub mod options;
pub mod progress;

pub use engine::ExecutionEngine;
pub use handle::ExecutionHandle;
pub use operation::Operation;
pub use options::{FailedHandler, InterruptedHandler, RunOptions};
pub use progress::{ProgressCallback, ProgressListener};
