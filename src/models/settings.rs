use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Engine-wide settings loaded from `opexec.yaml`.
///
/// Every field has a default, so a partial or missing file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Worker threads are named `<prefix>-<run id>`.
    pub worker_name_prefix: String,

    /// Value of [`RunOptions::abortable`](crate::services::RunOptions::abortable)
    /// for options built by the engine.
    pub default_abortable: bool,

    /// Deadline after which every abortable run gets an abort request.
    /// `None` disables the timer.
    pub default_abort_after_secs: Option<u64>,

    /// Trace every progress report at `TRACE` level.
    pub log_progress: bool,

    /// Buffer size of the run event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_name_prefix: "opexec-worker".to_string(),
            default_abortable: true,
            default_abort_after_secs: None,
            log_progress: false,
            event_capacity: 100,
        }
    }
}

impl EngineSettings {
    pub fn default_abort_after(&self) -> Option<Duration> {
        self.default_abort_after_secs.map(Duration::from_secs)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.worker_name_prefix.trim().is_empty() {
            return Err(SettingsError::EmptyWorkerPrefix);
        }
        // Thread names cannot carry interior NUL bytes
        if self.worker_name_prefix.contains('\0') {
            return Err(SettingsError::NulInWorkerPrefix);
        }
        if self.event_capacity == 0 {
            return Err(SettingsError::ZeroEventCapacity);
        }
        if self.default_abort_after_secs == Some(0) {
            return Err(SettingsError::ZeroDeadline);
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("worker_name_prefix must not be empty")]
    EmptyWorkerPrefix,

    #[error("worker_name_prefix must not contain NUL bytes")]
    NulInWorkerPrefix,

    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,

    #[error("default_abort_after_secs must be greater than zero when set")]
    ZeroDeadline,
}
