// Engine state module
//
// Tracks the set of active runs behind Arc<RwLock<T>> and broadcasts a
// RunEvent for every lifecycle change so observers do not need to poll.

use crate::models::{OutcomeKind, RunId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Events emitted as runs move through their lifecycle
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    /// A run was accepted and its worker is starting
    Submitted {
        run: RunId,
        label: Option<String>,
    },

    /// The operation reported progress
    Progress {
        run: RunId,
        total: u64,
        completed: u64,
    },

    /// The caller asked the run to stop
    AbortRequested {
        run: RunId,
    },

    /// The run latched its outcome
    Completed {
        run: RunId,
        kind: OutcomeKind,
        elapsed: Duration,
    },
}

impl RunEvent {
    pub fn run(&self) -> RunId {
        match self {
            RunEvent::Submitted { run, .. }
            | RunEvent::Progress { run, .. }
            | RunEvent::AbortRequested { run }
            | RunEvent::Completed { run, .. } => *run,
        }
    }
}

/// Snapshot of one active run
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: RunId,
    pub label: Option<String>,
    pub submitted_at: Instant,
    pub total_steps: u64,
    pub completed_steps: u64,
    pub abort_requested: bool,
}

/// Thread-safe registry of active runs with event emission
///
/// This is the observability surface of the engine:
/// - [`snapshot()`](Self::snapshot) and [`read()`](Self::read) for the current set of runs
/// - [`subscribe()`](Self::subscribe) for a stream of [`RunEvent`]s
///
/// Runs are removed from the active set as soon as they complete; the
/// `Completed` event is the last thing emitted for a run.
///
/// Cloning is cheap and every clone shares the same registry and channel.
#[derive(Clone)]
pub struct EngineState {
    runs: Arc<RwLock<HashMap<RunId, RunInfo>>>,

    /// Broadcast channel for run events; sending with no subscribers is fine
    event_tx: broadcast::Sender<RunEvent>,
}

impl EngineState {
    /// Create an empty registry whose event channel buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Subscribe to all future run events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    /// Active runs ordered by id
    pub fn snapshot(&self) -> Vec<RunInfo> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<RunInfo> = runs.values().cloned().collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Execute a function with read access to the active runs
    ///
    /// # Example
    /// ```ignore
    /// let aborting = state.read(|runs| runs.values().filter(|r| r.abort_requested).count());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&HashMap<RunId, RunInfo>) -> R,
    {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        f(&runs)
    }

    pub fn active_count(&self) -> usize {
        self.read(|runs| runs.len())
    }

    pub fn is_active(&self, run: RunId) -> bool {
        self.read(|runs| runs.contains_key(&run))
    }

    pub fn get(&self, run: RunId) -> Option<RunInfo> {
        self.read(|runs| runs.get(&run).cloned())
    }

    pub(crate) fn register(&self, run: RunId, label: Option<String>) {
        self.write(|runs| {
            runs.insert(
                run,
                RunInfo {
                    id: run,
                    label: label.clone(),
                    submitted_at: Instant::now(),
                    total_steps: 0,
                    completed_steps: 0,
                    abort_requested: false,
                },
            );
        });
        self.emit(RunEvent::Submitted { run, label });
    }

    pub(crate) fn record_progress(&self, run: RunId, total: u64, completed: u64) {
        self.write(|runs| {
            if let Some(info) = runs.get_mut(&run) {
                info.total_steps = total;
                info.completed_steps = completed;
            }
        });
        self.emit(RunEvent::Progress {
            run,
            total,
            completed,
        });
    }

    pub(crate) fn record_abort(&self, run: RunId) {
        self.write(|runs| {
            if let Some(info) = runs.get_mut(&run) {
                info.abort_requested = true;
            }
        });
        self.emit(RunEvent::AbortRequested { run });
    }

    pub(crate) fn complete(&self, run: RunId, kind: OutcomeKind, elapsed: Duration) {
        self.write(|runs| {
            runs.remove(&run);
        });
        self.emit(RunEvent::Completed { run, kind, elapsed });
    }

    fn write<F>(&self, f: F)
    where
        F: FnOnce(&mut HashMap<RunId, RunInfo>),
    {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut runs);
    }

    fn emit(&self, event: RunEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.event_tx.send(event);
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(100)
    }
}
