// Single-fire completion latch
//
// Holds a run's outcome once it exists and hands it to waiters and
// handlers. Completion happens in two steps: `latch` records the outcome
// (and rejects any second attempt), `deliver` dispatches the handlers that
// were registered before that point and then releases waiters. Waiters
// therefore never observe an outcome before its handlers are queued.

use crate::dispatch::Dispatcher;
use crate::models::{Outcome, OutcomeKind, RunId};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) type OutcomeHandler<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

/// A handler plus the outcome kind it cares about (`None` = any)
struct Registered<T> {
    kind: Option<OutcomeKind>,
    handler: OutcomeHandler<T>,
}

impl<T> Registered<T> {
    fn accepts(&self, kind: OutcomeKind) -> bool {
        self.kind.is_none_or(|wanted| wanted == kind)
    }
}

struct Slot<T> {
    outcome: Option<Outcome<T>>,
    settled: bool,
    handlers: Vec<Registered<T>>,
}

/// Outcome that has been latched but not yet delivered
pub(crate) struct Delivery<T> {
    outcome: Outcome<T>,
    handlers: Vec<Registered<T>>,
}

impl<T> Delivery<T> {
    pub(crate) fn outcome(&self) -> &Outcome<T> {
        &self.outcome
    }
}

pub(crate) struct CompletionLatch<T> {
    slot: Mutex<Slot<T>>,
    settled_cv: Condvar,
    settled_notify: Notify,
}

impl<T> CompletionLatch<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                outcome: None,
                settled: false,
                handlers: Vec::new(),
            }),
            settled_cv: Condvar::new(),
            settled_notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kind of the latched outcome, if any
    pub(crate) fn latched_kind(&self) -> Option<OutcomeKind> {
        self.lock().outcome.as_ref().map(Outcome::kind)
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.lock().settled
    }

    /// Kind of the outcome once it has been delivered
    pub(crate) fn settled_kind(&self) -> Option<OutcomeKind> {
        let slot = self.lock();
        if slot.settled {
            slot.outcome.as_ref().map(Outcome::kind)
        } else {
            None
        }
    }

    /// Run `f` with the slot locked, unless an outcome is already latched.
    /// No outcome can be latched while `f` runs.
    pub(crate) fn while_pending<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let slot = self.lock();
        if slot.outcome.is_some() {
            return None;
        }
        let result = f();
        drop(slot);
        Some(result)
    }

    fn settle(&self) {
        self.lock().settled = true;
        self.settled_cv.notify_all();
        self.settled_notify.notify_waiters();
    }
}

/// Releases waiters when dropped, including while unwinding out of a
/// panicking inline handler
struct SettleOnDrop<'a, T> {
    latch: &'a CompletionLatch<T>,
}

impl<T> Drop for SettleOnDrop<'_, T> {
    fn drop(&mut self) {
        self.latch.settle();
    }
}

impl<T: Clone + Send + 'static> CompletionLatch<T> {
    /// Record the outcome. Fails with the already latched kind on a second
    /// attempt; the rejected outcome is dropped.
    pub(crate) fn latch(&self, outcome: Outcome<T>) -> Result<Delivery<T>, OutcomeKind> {
        let mut slot = self.lock();
        if let Some(existing) = &slot.outcome {
            return Err(existing.kind());
        }
        let handlers = std::mem::take(&mut slot.handlers);
        slot.outcome = Some(outcome.clone());
        drop(slot);
        Ok(Delivery { outcome, handlers })
    }

    /// Dispatch matching handlers, then release waiters
    pub(crate) fn deliver(&self, delivery: Delivery<T>, dispatcher: &dyn Dispatcher, run: RunId) {
        let Delivery { outcome, handlers } = delivery;
        let kind = outcome.kind();
        let _settle = SettleOnDrop { latch: self };

        let mut matched = 0usize;
        for registered in handlers {
            if registered.accepts(kind) {
                matched += 1;
                let outcome = outcome.clone();
                let handler = registered.handler;
                dispatcher.dispatch(Box::new(move || handler(outcome)));
            }
        }

        if matched == 0 {
            tracing::debug!("{} completed as {} with no handler registered", run, kind);
        }
    }

    /// Register a handler. If the outcome is already latched the handler is
    /// dispatched right away.
    pub(crate) fn register(
        &self,
        kind: Option<OutcomeKind>,
        handler: OutcomeHandler<T>,
        dispatcher: &dyn Dispatcher,
    ) {
        let registered = Registered { kind, handler };
        let mut slot = self.lock();
        match &slot.outcome {
            Some(outcome) => {
                let outcome = outcome.clone();
                drop(slot);
                if registered.accepts(outcome.kind()) {
                    let handler = registered.handler;
                    dispatcher.dispatch(Box::new(move || handler(outcome)));
                }
            }
            None => slot.handlers.push(registered),
        }
    }

    /// The delivered outcome, without waiting
    pub(crate) fn peek(&self) -> Option<Outcome<T>> {
        let slot = self.lock();
        if slot.settled {
            slot.outcome.clone()
        } else {
            None
        }
    }

    pub(crate) fn wait_blocking(&self) -> Outcome<T> {
        let mut slot = self.lock();
        loop {
            if let (true, Some(outcome)) = (slot.settled, slot.outcome.as_ref()) {
                return outcome.clone();
            }
            slot = self
                .settled_cv
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        let slot = self.lock();
        let (slot, _) = self
            .settled_cv
            .wait_timeout_while(slot, timeout, |slot| !slot.settled)
            .unwrap_or_else(PoisonError::into_inner);
        if slot.settled {
            slot.outcome.clone()
        } else {
            None
        }
    }

    pub(crate) async fn wait(&self) -> Outcome<T> {
        loop {
            let notified = self.settled_notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent settle is not missed
            notified.as_mut().enable();

            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }
}
