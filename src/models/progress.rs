use super::RunId;

/// Answer returned to an operation each time it reports progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressSignal {
    /// Keep going.
    Proceed,
    /// The caller asked to stop. The operation should wind down and return
    /// [`OperationError::Interrupted`](crate::error::OperationError::Interrupted).
    Abort,
}

impl ProgressSignal {
    pub fn is_abort(self) -> bool {
        matches!(self, ProgressSignal::Abort)
    }
}

/// A progress report as delivered to the caller's `on_progress` listener.
///
/// `total == 0` means the operation has no determinate step count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub run: RunId,
    pub total: u64,
    pub completed: u64,
}

impl ProgressUpdate {
    pub fn is_indeterminate(&self) -> bool {
        self.total == 0
    }

    /// Completed fraction in `[0.0, 1.0]`, or `None` when indeterminate.
    pub fn fraction(&self) -> Option<f64> {
        if self.is_indeterminate() {
            None
        } else {
            Some((self.completed as f64 / self.total as f64).min(1.0))
        }
    }
}
