//! Tests for the running-mean merge
//!
//! These tests verify that:
//! - Any batching of N trials merged in any order gives the plain mean over N
//! - The Total row equals the sum of the cohort rows after every merge
//! - Combining two estimates equals merging all of their batches

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{snapshot, trial_with_cap};
use crate::aggregate::{BatchAccumulator, RunningEstimate};
use crate::model::{BatchSummary, TrialOutcome};
use crate::pool::DEFAULT_TICKET_ARRAY_CAP;

const TOLERANCE: f64 = 1e-9;

fn simulate_outcomes(n: usize, seed: u64) -> (Vec<u32>, Vec<TrialOutcome>) {
    let snapshot = snapshot(&[(1, 120), (2, 60), (3, 25), (5, 4)], 30, 12);
    let mut trial = trial_with_cap(&snapshot, DEFAULT_TICKET_ARRAY_CAP);
    let mut rng = SmallRng::seed_from_u64(seed);
    let outcomes = (0..n).map(|_| trial.run(&mut rng).clone()).collect();
    (snapshot.cohort_keys(), outcomes)
}

fn exact_means(outcomes: &[TrialOutcome], cohorts: usize) -> (Vec<f64>, Vec<f64>) {
    let n = outcomes.len() as f64;
    let mean = |pick: fn(&TrialOutcome) -> &[u32]| -> Vec<f64> {
        (0..cohorts)
            .map(|c| outcomes.iter().map(|o| f64::from(pick(o)[c])).sum::<f64>() / n)
            .collect()
    };
    (mean(TrialOutcome::entered), mean(TrialOutcome::waitlisted))
}

fn split_into_batches<R: Rng>(
    keys: &[u32],
    outcomes: &[TrialOutcome],
    rng: &mut R,
) -> Vec<BatchSummary> {
    let mut batches = Vec::new();
    let mut rest = outcomes;
    while !rest.is_empty() {
        let size = rng.random_range(1..=rest.len().min(17));
        let (head, tail) = rest.split_at(size);
        let mut acc = BatchAccumulator::new(keys);
        for outcome in head {
            acc.record(outcome);
        }
        batches.push(acc.take_summary());
        rest = tail;
    }
    batches
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < TOLERANCE,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_any_batching_and_order_gives_plain_mean() {
    let (keys, outcomes) = simulate_outcomes(400, 3);
    let (entered, waitlisted) = exact_means(&outcomes, keys.len());
    let mut rng = SmallRng::seed_from_u64(99);

    for _ in 0..25 {
        let mut batches = split_into_batches(&keys, &outcomes, &mut rng);
        batches.shuffle(&mut rng);

        let mut estimate = RunningEstimate::new(&keys);
        for batch in &batches {
            estimate.merge(batch).unwrap();
        }

        assert_eq!(estimate.trials(), outcomes.len() as u64);
        for (i, &key) in keys.iter().enumerate() {
            assert_close(estimate.entered(key).unwrap(), entered[i]);
            assert_close(estimate.waitlisted(key).unwrap(), waitlisted[i]);
        }
    }
}

#[test]
fn test_single_trial_batches_match_one_big_batch() {
    let (keys, outcomes) = simulate_outcomes(64, 8);

    let mut one_by_one = RunningEstimate::new(&keys);
    let mut acc = BatchAccumulator::new(&keys);
    for outcome in &outcomes {
        acc.record(outcome);
        one_by_one.merge(&acc.take_summary()).unwrap();
    }

    let mut all_at_once = RunningEstimate::new(&keys);
    for outcome in &outcomes {
        acc.record(outcome);
    }
    all_at_once.merge(&acc.take_summary()).unwrap();

    for &key in &keys {
        assert_close(one_by_one.entered(key).unwrap(), all_at_once.entered(key).unwrap());
        assert_close(
            one_by_one.waitlisted(key).unwrap(),
            all_at_once.waitlisted(key).unwrap(),
        );
    }
}

#[test]
fn test_total_row_is_cohort_sum_after_every_merge() {
    let (keys, outcomes) = simulate_outcomes(120, 21);
    let mut rng = SmallRng::seed_from_u64(4);
    let batches = split_into_batches(&keys, &outcomes, &mut rng);

    let mut estimate = RunningEstimate::new(&keys);
    for batch in &batches {
        estimate.merge(batch).unwrap();

        let rows = estimate.rows();
        let (total, cohorts) = rows.split_last().unwrap();
        assert_close(total.entered, cohorts.iter().map(|r| r.entered).sum());
        assert_close(total.waitlisted, cohorts.iter().map(|r| r.waitlisted).sum());
        // 30 primary and 12 waitlist winners in every trial
        assert_close(total.entered, 30.0);
        assert_close(total.waitlisted, 12.0);
    }
}

#[test]
fn test_combining_partial_estimates() {
    let (keys, outcomes) = simulate_outcomes(90, 13);
    let (left, right) = outcomes.split_at(37);
    let (entered, _) = exact_means(&outcomes, keys.len());

    let fold = |part: &[TrialOutcome]| {
        let mut acc = BatchAccumulator::new(&keys);
        part.iter().for_each(|o| acc.record(o));
        let mut estimate = RunningEstimate::new(&keys);
        estimate.merge(&acc.take_summary()).unwrap();
        estimate
    };

    let mut combined = fold(right);
    combined.combine(&fold(left)).unwrap();

    assert_eq!(combined.trials(), 90);
    for (i, &key) in keys.iter().enumerate() {
        assert_close(combined.entered(key).unwrap(), entered[i]);
    }
}
