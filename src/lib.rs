// opexec - asynchronous operation execution core
//
// Runs long-running operations off the caller's context, reports their
// progress, supports cooperative cancellation, and delivers exactly one
// outcome per run back onto the caller's context.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use dispatch::{Dispatcher, EventLoop, EventLoopHandle, Job};
pub use error::{ExecutionError, ExecutionFailure, OperationError};
pub use metrics::Metrics;
pub use models::{
    ContextResources, EngineSettings, Outcome, OutcomeKind, ProgressSignal, ProgressUpdate, RunId,
    RunPhase,
};
pub use services::{ExecutionEngine, ExecutionHandle, Operation, ProgressCallback, RunOptions};
pub use state::{EngineState, RunEvent, RunInfo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
