use std::thread;
use std::time::{Duration, Instant};

use drawsim_core::model::BatchSummary;

use super::*;
use crate::coordinator::{Fault, RunState};
use crate::error::RunError;
use crate::worker::{FaultKind, WorkerEvent};

fn panic_fault(worker: usize, after: u64, attempts: u32) -> Fault {
    Fault {
        worker,
        after,
        kind: FaultKind::Panic,
        attempts,
    }
}

#[test]
fn test_crashed_share_is_redispatched() {
    let config = EngineConfig {
        batch_size: Some(5),
        max_retries: 2,
        ..config(2)
    };
    let (mut coordinator, _updates) = coordinator(config);
    coordinator.inject_fault(panic_fault(0, 10, 1));

    coordinator.request(&snapshot(&[(1, 100), (2, 50)], 50, 0), 40);
    let update = coordinator.run_to_completion().unwrap();

    assert_eq!(update.trials_completed, 40);
    assert_eq!(update.estimate.total().unwrap().entered, 50.0);
    let status = coordinator.status().unwrap();
    assert_eq!(status.retries_used, 1);
    assert_eq!(status.state, RunState::Complete);
}

#[test]
fn test_silently_exited_worker_is_redispatched() {
    let config = EngineConfig {
        batch_size: Some(5),
        max_retries: 2,
        ..config(2)
    };
    let (mut coordinator, _updates) = coordinator(config);
    coordinator.inject_fault(Fault {
        worker: 0,
        after: 10,
        kind: FaultKind::Exit,
        attempts: 1,
    });

    coordinator.request(&snapshot(&[(1, 100), (2, 50)], 50, 0), 40);
    let update = coordinator.run_to_completion().unwrap();

    assert_eq!(update.trials_completed, 40);
    assert_eq!(coordinator.status().unwrap().retries_used, 1);
}

#[test]
fn test_failure_queued_behind_thread_exit_is_recovered_once() {
    let config = EngineConfig {
        batch_size: Some(5),
        max_retries: 2,
        ..config(1)
    };
    let (mut coordinator, _updates) = coordinator(config);
    coordinator.inject_fault(panic_fault(0, 10, 1));

    coordinator.request(&snapshot(&[(1, 100), (2, 50)], 50, 0), 1000);
    // The thread has exited by now with its batches and failure still queued
    thread::sleep(Duration::from_millis(500));
    coordinator.pump(Instant::now());
    let update = coordinator.run_to_completion().unwrap();

    assert_eq!(update.trials_completed, 1000);
    assert_eq!(coordinator.status().unwrap().retries_used, 1);
}

#[test]
fn test_crash_after_last_batch_needs_no_retry() {
    let config = EngineConfig {
        batch_size: Some(5),
        max_retries: 0,
        ..config(1)
    };
    let (mut coordinator, _updates) = coordinator(config);
    coordinator.inject_fault(panic_fault(0, 20, 1));

    coordinator.request(&snapshot(&[(1, 100), (2, 50)], 50, 0), 20);
    let update = coordinator.run_to_completion().unwrap();

    assert_eq!(update.trials_completed, 20);
    assert_eq!(coordinator.status().unwrap().retries_used, 0);
}

#[test]
fn test_retry_budget_is_bounded() {
    let config = EngineConfig {
        max_retries: 2,
        ..config(2)
    };
    let (mut coordinator, updates) = coordinator(config);
    coordinator.inject_fault(panic_fault(1, 0, u32::MAX));

    let run_id = coordinator.request(&snapshot(&[(1, 100), (2, 50)], 50, 0), 400);
    assert_eq!(
        coordinator.run_to_completion(),
        Err(RunError::WorkersExhausted { run_id, retries: 2 })
    );
    assert_eq!(coordinator.status().unwrap().retries_used, 2);
    assert!(updates.try_iter().all(|u| !u.is_complete));
}

#[test]
fn test_inconsistent_batch_fails_the_run() {
    let (mut coordinator, updates) = coordinator(config(1));
    let run_id = coordinator.request(&large_snapshot(), 1_000_000);

    coordinator
        .event_sender()
        .send(WorkerEvent::Batch {
            worker: 0,
            run_id,
            attempt: 0,
            summary: BatchSummary {
                cohort_keys: vec![99],
                trials: 1,
                entered_mean: vec![1.0],
                waitlisted_mean: vec![0.0],
            },
        })
        .unwrap();

    match coordinator.run_to_completion() {
        Err(RunError::Inconsistent { run_id: failed, .. }) => assert_eq!(failed, run_id),
        other => panic!("expected inconsistent batch failure, got {other:?}"),
    }
    assert!(updates.try_iter().all(|u| !u.is_complete));
}

#[test]
fn test_batch_beyond_share_fails_the_run() {
    let (mut coordinator, updates) = coordinator(config(1));
    let population = large_snapshot();
    let keys = population.cohort_keys();
    let run_id = coordinator.request(&population, 1_000_000);

    coordinator
        .event_sender()
        .send(WorkerEvent::Batch {
            worker: 0,
            run_id,
            attempt: 0,
            summary: BatchSummary {
                entered_mean: vec![0.0; keys.len()],
                waitlisted_mean: vec![0.0; keys.len()],
                cohort_keys: keys,
                trials: 2_000_000,
            },
        })
        .unwrap();

    match coordinator.run_to_completion() {
        Err(RunError::ShareOverrun {
            run_id: failed,
            worker: 0,
            trials: 2_000_000,
            ..
        }) => assert_eq!(failed, run_id),
        other => panic!("expected share overrun, got {other:?}"),
    }
    assert!(updates.try_iter().all(|u| !u.is_complete));
}

#[test]
fn test_failed_worker_is_respawned_for_the_next_run() {
    let (mut coordinator, _updates) = coordinator(EngineConfig {
        max_retries: 0,
        ..config(1)
    });
    coordinator.inject_fault(panic_fault(0, 0, 1));
    coordinator.request(&snapshot(&[(1, 10)], 2, 0), 10);
    assert!(matches!(
        coordinator.run_to_completion(),
        Err(RunError::WorkersExhausted { retries: 0, .. })
    ));

    coordinator.clear_faults();
    coordinator.request(&snapshot(&[(1, 10)], 2, 0), 10);
    assert_eq!(coordinator.run_to_completion().unwrap().trials_completed, 10);
    assert_eq!(coordinator.pool().live_workers(), 1);
}
