use std::fmt;

/// Identifier of a single submitted run.
///
/// Ids are allocated by the [`ExecutionEngine`](crate::services::ExecutionEngine)
/// that accepted the run and are unique per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Which of the three terminal outcomes a run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Failed,
    Interrupted,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a run.
///
/// `Pending -> Running -> Completed(kind)`. `Pending` lasts only until the
/// worker thread picks the run up; `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Running,
    Completed(OutcomeKind),
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed(_))
    }
}
