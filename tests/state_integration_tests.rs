//! Integration tests for EngineState with run events
//!
//! These tests verify that a run, driven through the engine:
//! - Emits Submitted, Progress and Completed events in order
//! - Reports abort requests to every subscriber
//! - Never reports an abort request after the run's completion
//! - Is tracked as active only until it completes

use opexec::{
    EngineSettings, EventLoop, ExecutionEngine, ExecutionHandle, Job, OperationError, OutcomeKind,
    ProgressCallback, RunEvent, RunOptions,
};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

async fn next_event(rx: &mut broadcast::Receiver<RunEvent>) -> RunEvent {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

#[tokio::test]
async fn test_run_lifecycle_events() {
    let (dispatcher, mut event_loop) = EventLoop::channel();
    let engine = ExecutionEngine::new(dispatcher, Handle::current());
    let mut rx = engine.subscribe();

    let options = RunOptions {
        label: Some("lifecycle".to_string()),
        ..engine.options()
    };
    let run = engine.submit_with(
        |progress: &ProgressCallback| {
            progress.report(2, 0);
            progress.report(2, 1);
            progress.report(2, 2);
            Ok(())
        },
        options,
    );
    event_loop.run_until(run.wait()).await;

    let event = next_event(&mut rx).await;
    assert_eq!(
        event,
        RunEvent::Submitted {
            run: run.id(),
            label: Some("lifecycle".to_string())
        }
    );

    for completed in 0..=2 {
        let event = next_event(&mut rx).await;
        assert!(
            matches!(event, RunEvent::Progress { total: 2, completed: c, .. } if c == completed),
            "Expected Progress({}), got: {:?}",
            completed,
            event
        );
    }

    let event = next_event(&mut rx).await;
    assert!(
        matches!(event, RunEvent::Completed { kind: OutcomeKind::Success, .. }),
        "Expected Completed(success), got: {:?}",
        event
    );
    assert_eq!(event.run(), run.id());
}

#[tokio::test]
async fn test_abort_request_event_reaches_all_subscribers() {
    let (dispatcher, mut event_loop) = EventLoop::channel();
    let engine = ExecutionEngine::new(dispatcher, Handle::current());
    let mut rx1 = engine.subscribe();
    let mut rx2 = engine.subscribe();

    let gate = Arc::new(Barrier::new(2));
    let gate_clone = Arc::clone(&gate);
    let run: ExecutionHandle<()> = engine.submit(move |progress: &ProgressCallback| {
        gate_clone.wait();
        if progress.report(0, 0).is_abort() {
            return Err(OperationError::Interrupted);
        }
        Ok(())
    });

    engine.request_abort(&run);
    gate.wait();
    event_loop.run_until(run.wait()).await;

    for rx in [&mut rx1, &mut rx2] {
        assert!(matches!(next_event(rx).await, RunEvent::Submitted { .. }));
        assert_eq!(
            next_event(rx).await,
            RunEvent::AbortRequested { run: run.id() }
        );
        assert!(matches!(next_event(rx).await, RunEvent::Progress { .. }));
        assert!(matches!(
            next_event(rx).await,
            RunEvent::Completed {
                kind: OutcomeKind::Interrupted,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn test_abort_racing_completion_never_follows_completed() {
    let settings = EngineSettings {
        event_capacity: 4096,
        ..EngineSettings::default()
    };
    let engine = ExecutionEngine::with_settings(|job: Job| job(), Handle::current(), settings)
        .expect("valid settings");
    let mut rx = engine.subscribe();

    // Operations finish immediately, so aborts land on both sides of completion
    let runs: Vec<ExecutionHandle<()>> = (0..200)
        .map(|_| engine.submit(|_: &ProgressCallback| Ok(())))
        .collect();
    let accepted = runs.iter().filter(|run| run.request_abort()).count();
    for run in &runs {
        run.wait().await;
    }

    let mut completed = HashSet::new();
    let mut abort_events = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            RunEvent::Completed { run, .. } => {
                completed.insert(run);
            }
            RunEvent::AbortRequested { run } => {
                assert!(
                    !completed.contains(&run),
                    "AbortRequested for {} arrived after Completed",
                    run
                );
                abort_events += 1;
            }
            _ => {}
        }
    }

    assert_eq!(completed.len(), runs.len());
    assert_eq!(abort_events, accepted);
    assert_eq!(
        engine.metrics().abort_requests.load(Ordering::Relaxed),
        accepted as u64
    );
}

#[tokio::test]
async fn test_active_runs_tracked_until_completion() {
    let (dispatcher, mut event_loop) = EventLoop::channel();
    let engine = ExecutionEngine::new(dispatcher, Handle::current());

    let gate = Arc::new(Barrier::new(2));
    let gate_clone = Arc::clone(&gate);
    let run = engine.submit(move |progress: &ProgressCallback| {
        progress.report(4, 1);
        gate_clone.wait();
        Ok(())
    });

    // Wait for the first report to land before inspecting
    let mut rx = engine.subscribe();
    while !matches!(engine.state().get(run.id()), Some(info) if info.completed_steps == 1) {
        let _ = timeout(Duration::from_millis(50), rx.recv()).await;
    }

    let snapshot = engine.state().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, run.id());
    assert_eq!(snapshot[0].total_steps, 4);
    assert!(engine.state().is_active(run.id()));

    gate.wait();
    event_loop.run_until(run.wait()).await;

    assert!(!engine.state().is_active(run.id()));
    assert_eq!(engine.state().active_count(), 0);
}

#[tokio::test]
async fn test_events_with_no_subscribers_are_dropped() {
    let (dispatcher, mut event_loop) = EventLoop::channel();
    let engine = ExecutionEngine::new(dispatcher, Handle::current());

    // No subscriber yet; the run must still complete normally
    let run = engine.submit(|_: &ProgressCallback| Ok(1u8));
    event_loop.run_until(run.wait()).await;

    let mut rx = engine.subscribe();
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}
