// EventLoop - a caller-owned job queue
//
// Background workers push jobs through an EventLoopHandle; the thread that
// owns the EventLoop runs them. This gives handlers a single, known thread
// to run on without requiring any particular UI toolkit.

use super::{Dispatcher, Job};
use std::future::Future;
use tokio::sync::mpsc;

/// Receiving half: owned by the caller's context, which runs the jobs.
///
/// # Example
/// ```ignore
/// let (handle, mut event_loop) = EventLoop::channel();
/// let engine = ExecutionEngine::new(handle, runtime.handle().clone());
///
/// let run = engine.submit(|_progress: &ProgressCallback| Ok(42));
/// run.on_success(|value| println!("got {value}"));
///
/// // Drive handlers on this thread while waiting for the run
/// let outcome = event_loop.run_until(run.wait()).await;
/// ```
pub struct EventLoop {
    job_rx: mpsc::UnboundedReceiver<Job>,
}

/// Sending half: cloneable, handed to the engine as its [`Dispatcher`].
#[derive(Clone)]
pub struct EventLoopHandle {
    job_tx: mpsc::UnboundedSender<Job>,
}

impl EventLoop {
    /// Create a connected handle/loop pair.
    ///
    /// The queue is unbounded: terminal outcomes must never be dropped under
    /// backpressure.
    pub fn channel() -> (EventLoopHandle, EventLoop) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        (EventLoopHandle { job_tx }, EventLoop { job_rx })
    }

    /// Run every job already queued, without waiting for more.
    ///
    /// # Returns
    /// The number of jobs that ran
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.job_rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it.
    ///
    /// Returns `false` once every handle has been dropped and the queue is
    /// empty.
    pub async fn run_next(&mut self) -> bool {
        match self.job_rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Blocking variant of [`run_next`](Self::run_next) for plain threads.
    ///
    /// Must not be called from inside an async context.
    pub fn blocking_run_next(&mut self) -> bool {
        match self.job_rx.blocking_recv() {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs as they arrive until `future` resolves, then drain whatever
    /// is still queued and return the future's output.
    pub async fn run_until<F>(&mut self, future: F) -> F::Output
    where
        F: Future,
    {
        tokio::pin!(future);

        loop {
            tokio::select! {
                biased;

                output = &mut future => {
                    self.run_pending();
                    return output;
                }
                job = self.job_rx.recv() => match job {
                    Some(job) => job(),
                    None => return future.await,
                },
            }
        }
    }
}

impl Dispatcher for EventLoopHandle {
    fn dispatch(&self, job: Job) {
        if self.job_tx.send(job).is_err() {
            tracing::warn!("Failed to dispatch job - event loop has been dropped");
        }
    }
}

impl EventLoopHandle {
    /// Whether the receiving [`EventLoop`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.job_tx.is_closed()
    }
}
