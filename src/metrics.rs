// Run metrics
//
// Lightweight counters for monitoring engine activity

use crate::models::OutcomeKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Engine-wide run metrics.
///
/// Uses atomic operations for thread-safe tracking without locks. Workers,
/// abort requesters and progress callbacks all record into the same
/// instance, which the engine shares behind an `Arc`.
#[derive(Debug)]
pub struct Metrics {
    /// Runs accepted by `submit`
    pub runs_submitted: AtomicU64,

    /// Runs that latched `Success`
    pub runs_succeeded: AtomicU64,

    /// Runs that latched `Failed`
    pub runs_failed: AtomicU64,

    /// Runs that latched `Interrupted`
    pub runs_interrupted: AtomicU64,

    /// Abort requests that newly set a run's flag
    pub abort_requests: AtomicU64,

    /// Progress callback invocations
    pub progress_reports: AtomicU64,

    /// Completion attempts rejected because the run had already latched
    pub contract_violations: AtomicU64,

    /// Operation panics caught at the worker boundary
    pub panics_caught: AtomicU64,

    /// Total time spent inside operations, in milliseconds
    pub total_run_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_submitted: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_interrupted: AtomicU64::new(0),
            abort_requests: AtomicU64::new(0),
            progress_reports: AtomicU64::new(0),
            contract_violations: AtomicU64::new(0),
            panics_caught: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_submitted(&self) {
        self.runs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a latched outcome and the time the operation took
    pub fn record_completion(&self, kind: OutcomeKind, elapsed: Duration) {
        let counter = match kind {
            OutcomeKind::Success => &self.runs_succeeded,
            OutcomeKind::Failed => &self.runs_failed,
            OutcomeKind::Interrupted => &self.runs_interrupted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_run_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_abort_request(&self) {
        self.abort_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_report(&self) {
        self.progress_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contract_violation(&self) {
        self.contract_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics_caught.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs that have latched any outcome
    pub fn completed_runs(&self) -> u64 {
        self.runs_succeeded.load(Ordering::Relaxed)
            + self.runs_failed.load(Ordering::Relaxed)
            + self.runs_interrupted.load(Ordering::Relaxed)
    }

    /// Submitted runs that have not latched yet
    pub fn in_flight(&self) -> u64 {
        self.runs_submitted
            .load(Ordering::Relaxed)
            .saturating_sub(self.completed_runs())
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average operation time per completed run in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        let count = self.completed_runs();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Execution Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} submitted, {} succeeded, {} failed, {} interrupted, {} in flight",
            self.runs_submitted.load(Ordering::Relaxed),
            self.runs_succeeded.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed),
            self.runs_interrupted.load(Ordering::Relaxed),
            self.in_flight()
        );
        tracing::info!(
            "Total run time: {:.2}s (avg: {:.2}ms per run)",
            self.total_run_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_run_time_ms()
        );
        tracing::info!(
            "Abort requests: {}, progress reports: {}, panics caught: {}, contract violations: {}",
            self.abort_requests.load(Ordering::Relaxed),
            self.progress_reports.load(Ordering::Relaxed),
            self.panics_caught.load(Ordering::Relaxed),
            self.contract_violations.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
