use std::time::{Duration, Instant};

use drawsim_core::model::CohortKey;

use super::*;
use crate::coordinator::RunState;
use crate::error::RunError;

#[test]
fn test_run_completes_with_exact_trial_count() {
    let (mut coordinator, updates) = coordinator(config(3));
    let snapshot = snapshot(&[(1, 100), (2, 50)], 50, 0);

    let run_id = coordinator.request(&snapshot, 31);
    let update = coordinator.run_to_completion().unwrap();

    assert_eq!(update.run_id, run_id);
    assert!(update.is_complete);
    assert_eq!(update.trials_completed, 31);
    assert_eq!(update.estimate.trials, 31);
    assert_eq!(update.estimate.total().unwrap().entered, 50.0);
    assert_eq!(coordinator.state(), RunState::Complete);

    let published: Vec<EstimateUpdate> = updates.try_iter().collect();
    assert_eq!(published.last(), Some(&update));
    assert!(published[..published.len() - 1].iter().all(|u| !u.is_complete));
}

#[test]
fn test_single_trial_fills_every_primary_slot() {
    let (mut coordinator, _updates) = coordinator(config(4));
    coordinator.request(&snapshot(&[(1, 100), (2, 50)], 50, 0), 1);
    let update = coordinator.run_to_completion().unwrap();

    let total = update.estimate.total().unwrap();
    assert_eq!(total.entered, 50.0);
    assert_eq!(total.waitlisted, 0.0);
    let cohorts = update.estimate.row(CohortKey::Tickets(1)).unwrap().entered
        + update.estimate.row(CohortKey::Tickets(2)).unwrap().entered;
    assert_eq!(cohorts, 50.0);
}

#[test]
fn test_zero_trials_completes_immediately() {
    let (mut coordinator, updates) = coordinator(config(2));
    coordinator.request(&snapshot(&[(1, 10)], 3, 0), 0);

    assert_eq!(coordinator.state(), RunState::Complete);
    let update = updates.try_recv().unwrap();
    assert!(update.is_complete);
    assert_eq!(update.trials_completed, 0);
    assert_eq!(coordinator.pool().live_workers(), 0);
}

#[test]
fn test_estimates_stay_within_cohort_sizes() {
    let (mut coordinator, _updates) = coordinator(config(2));
    let snapshot = snapshot(&[(1, 20), (5, 4)], 15, 10);
    coordinator.request(&snapshot, 200);
    let update = coordinator.run_to_completion().unwrap();

    for cohort in snapshot.cohorts() {
        let row = update.estimate.row(CohortKey::Tickets(cohort.tickets_per)).unwrap();
        assert!(row.entered + row.waitlisted <= f64::from(cohort.applicants) + 1e-9);
    }
    // Draws exceed the population, so every applicant is drawn
    let total = update.estimate.total().unwrap();
    assert_eq!(total.entered + total.waitlisted, 24.0);
}

#[test]
fn test_superseded_run_publishes_nothing() {
    let (mut coordinator, updates) = coordinator(config(2));
    let first = coordinator.request(&large_snapshot(), 1_000_000);
    let second = coordinator.request(&snapshot(&[(1, 100), (2, 50)], 50, 0), 40);
    assert_ne!(first, second);

    let update = coordinator.run_to_completion().unwrap();
    assert_eq!(update.run_id, second);
    assert_eq!(update.trials_completed, 40);

    let published: Vec<EstimateUpdate> = updates.try_iter().collect();
    assert!(!published.is_empty());
    assert!(published.iter().all(|u| u.run_id == second));
    assert!(published.iter().all(|u| u.trials_completed <= 40));
}

#[test]
fn test_cancelled_run_reports_cancelled() {
    let (mut coordinator, updates) = coordinator(config(2));
    let run_id = coordinator.request(&large_snapshot(), 1_000_000);
    // Drain whatever was published before the cancel point
    coordinator.pump(Instant::now());
    let _ = updates.try_iter().count();

    coordinator.cancel();
    coordinator.pump(Instant::now());
    assert_eq!(
        coordinator.run_to_completion(),
        Err(RunError::Cancelled { run_id })
    );
    assert_eq!(updates.try_iter().count(), 0);
    assert!(coordinator.latest().is_none_or(|u| !u.is_complete));
}

#[test]
fn test_run_to_completion_without_request() {
    let (mut coordinator, _updates) = coordinator(config(1));
    assert_eq!(coordinator.run_to_completion(), Err(RunError::NoActiveRun));
    assert_eq!(coordinator.state(), RunState::Idle);
}

#[test]
fn test_publication_is_throttled_but_final_is_always_sent() {
    let config = EngineConfig {
        publish_interval_ms: 3_600_000,
        batch_size: Some(1),
        ..config(2)
    };
    let (mut coordinator, updates) = coordinator(config);
    coordinator.request(&snapshot(&[(1, 60), (3, 20)], 10, 5), 300);
    let update = coordinator.run_to_completion().unwrap();

    let published: Vec<EstimateUpdate> = updates.try_iter().collect();
    assert!(published.len() <= 2, "{} updates published", published.len());
    assert_eq!(published.last(), Some(&update));
    assert_eq!(coordinator.latest(), Some(&update));
}

#[test]
fn test_idle_workers_are_torn_down_and_respawned() {
    let config = EngineConfig {
        idle_timeout_ms: 1_000,
        ..config(2)
    };
    let (mut coordinator, _updates) = coordinator(config);
    let snapshot = snapshot(&[(1, 30)], 5, 0);

    coordinator.request(&snapshot, 20);
    coordinator.run_to_completion().unwrap();
    assert_eq!(coordinator.pool().live_workers(), 2);

    coordinator.pump(Instant::now() + Duration::from_secs(2));
    assert_eq!(coordinator.pool().live_workers(), 0);

    coordinator.request(&snapshot, 20);
    let update = coordinator.run_to_completion().unwrap();
    assert_eq!(update.trials_completed, 20);
}

#[test]
fn test_seeded_runs_agree() {
    let snapshot = snapshot(&[(1, 200), (2, 80), (4, 20)], 40, 10);
    let run = || {
        let (mut coordinator, _updates) = coordinator(config(3));
        coordinator.request(&snapshot, 300);
        coordinator.run_to_completion().unwrap().estimate
    };
    let (a, b) = (run(), run());

    for (x, y) in a.rows.iter().zip(&b.rows) {
        assert_eq!(x.key, y.key);
        assert!((x.entered - y.entered).abs() <= 1.5e-3);
        assert!((x.waitlisted - y.waitlisted).abs() <= 1.5e-3);
    }
}
