//! Aggregation of trial outcomes into per-cohort running means
//!
//! Workers fold trials into a [`BatchAccumulator`] and ship the resulting
//! [`BatchSummary`]. The coordinator folds summaries into a [`RunningEstimate`] with an
//! incremental weighted mean, which gives the same result for any batching and any merge
//! order. Rounding only happens when an estimate is published.

use crate::error::MergeError;
use crate::model::{BatchSummary, CohortKey, EstimateRow, PublishedEstimate, TrialOutcome};

/// Weighted mean of a prior over `prior_count` trials and a batch mean over `batch_count`.
///
/// Equivalent to `(n * prior + m * batch_mean) / (n + m)`, written as a correction of the
/// prior so large trial counts do not inflate the intermediate products.
pub fn merge_mean(prior_count: u64, prior: f64, batch_count: u64, batch_mean: f64) -> f64 {
    let total = prior_count + batch_count;
    if total == 0 {
        return 0.0;
    }
    prior + (batch_mean - prior) * (batch_count as f64 / total as f64)
}

/// Round to a fixed number of decimal places for display
pub fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// Integer win counts summed over a block of trials
#[derive(Debug, Clone)]
pub struct BatchAccumulator {
    cohort_keys: Vec<u32>,
    trials: u64,
    entered: Vec<u64>,
    waitlisted: Vec<u64>,
}

impl BatchAccumulator {
    pub fn new(cohort_keys: &[u32]) -> Self {
        Self {
            cohort_keys: cohort_keys.to_vec(),
            trials: 0,
            entered: vec![0; cohort_keys.len()],
            waitlisted: vec![0; cohort_keys.len()],
        }
    }

    pub fn record(&mut self, outcome: &TrialOutcome) {
        for (sum, &n) in self.entered.iter_mut().zip(outcome.entered()) {
            *sum += u64::from(n);
        }
        for (sum, &n) in self.waitlisted.iter_mut().zip(outcome.waitlisted()) {
            *sum += u64::from(n);
        }
        self.trials += 1;
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    /// Emit the means for the trials recorded so far and start a new batch
    pub fn take_summary(&mut self) -> BatchSummary {
        let trials = self.trials;
        let mean = |sums: &mut Vec<u64>| -> Vec<f64> {
            let means = sums
                .iter()
                .map(|&s| if trials == 0 { 0.0 } else { s as f64 / trials as f64 })
                .collect();
            sums.fill(0);
            means
        };

        let entered_mean = mean(&mut self.entered);
        let waitlisted_mean = mean(&mut self.waitlisted);
        self.trials = 0;

        BatchSummary {
            cohort_keys: self.cohort_keys.clone(),
            trials,
            entered_mean,
            waitlisted_mean,
        }
    }
}

/// Mean expected winners per cohort across every trial folded in so far
#[derive(Debug, Clone, PartialEq)]
pub struct RunningEstimate {
    cohort_keys: Vec<u32>,
    trials: u64,
    entered: Vec<f64>,
    waitlisted: Vec<f64>,
    total_entered: f64,
    total_waitlisted: f64,
}

impl RunningEstimate {
    pub fn new(cohort_keys: &[u32]) -> Self {
        Self {
            cohort_keys: cohort_keys.to_vec(),
            trials: 0,
            entered: vec![0.0; cohort_keys.len()],
            waitlisted: vec![0.0; cohort_keys.len()],
            total_entered: 0.0,
            total_waitlisted: 0.0,
        }
    }

    pub fn cohort_keys(&self) -> &[u32] {
        &self.cohort_keys
    }

    /// Trials folded in so far
    pub fn trials(&self) -> u64 {
        self.trials
    }

    /// Fold a batch summary in.
    ///
    /// A summary built for another cohort ordering is rejected and leaves the
    /// estimate untouched.
    pub fn merge(&mut self, batch: &BatchSummary) -> Result<(), MergeError> {
        if batch.cohort_keys != self.cohort_keys {
            return Err(MergeError::CohortMismatch {
                expected: self.cohort_keys.clone(),
                found: batch.cohort_keys.clone(),
            });
        }
        let cohorts = self.cohort_keys.len();
        for values in [&batch.entered_mean, &batch.waitlisted_mean] {
            if values.len() != cohorts {
                return Err(MergeError::MalformedBatch {
                    cohorts,
                    values: values.len(),
                });
            }
        }
        if batch.is_empty() {
            return Ok(());
        }

        let prior = self.trials;
        for (estimate, &mean) in self.entered.iter_mut().zip(&batch.entered_mean) {
            *estimate = merge_mean(prior, *estimate, batch.trials, mean);
        }
        for (estimate, &mean) in self.waitlisted.iter_mut().zip(&batch.waitlisted_mean) {
            *estimate = merge_mean(prior, *estimate, batch.trials, mean);
        }
        self.trials += batch.trials;

        self.total_entered = self.entered.iter().sum();
        self.total_waitlisted = self.waitlisted.iter().sum();
        Ok(())
    }

    /// Fold another estimate over the same cohorts into this one
    pub fn combine(&mut self, other: &RunningEstimate) -> Result<(), MergeError> {
        self.merge(&other.as_batch())
    }

    /// View this estimate as a single batch of `trials()` trials
    pub fn as_batch(&self) -> BatchSummary {
        BatchSummary {
            cohort_keys: self.cohort_keys.clone(),
            trials: self.trials,
            entered_mean: self.entered.clone(),
            waitlisted_mean: self.waitlisted.clone(),
        }
    }

    pub fn entered(&self, tickets_per: u32) -> Option<f64> {
        self.position(tickets_per).map(|i| self.entered[i])
    }

    pub fn waitlisted(&self, tickets_per: u32) -> Option<f64> {
        self.position(tickets_per).map(|i| self.waitlisted[i])
    }

    pub fn total_entered(&self) -> f64 {
        self.total_entered
    }

    pub fn total_waitlisted(&self) -> f64 {
        self.total_waitlisted
    }

    /// Unrounded rows, cohorts first then Total
    pub fn rows(&self) -> Vec<EstimateRow> {
        let mut rows: Vec<EstimateRow> = self
            .cohort_keys
            .iter()
            .zip(self.entered.iter().zip(&self.waitlisted))
            .map(|(&key, (&entered, &waitlisted))| EstimateRow {
                key: CohortKey::Tickets(key),
                entered,
                waitlisted,
            })
            .collect();
        rows.push(EstimateRow {
            key: CohortKey::Total,
            entered: self.total_entered,
            waitlisted: self.total_waitlisted,
        });
        rows
    }

    /// Rows rounded to `places` decimals for publication
    pub fn rounded(&self, places: u32) -> PublishedEstimate {
        let rows = self
            .rows()
            .into_iter()
            .map(|row| EstimateRow {
                entered: round_to(row.entered, places),
                waitlisted: round_to(row.waitlisted, places),
                ..row
            })
            .collect();
        PublishedEstimate {
            trials: self.trials,
            rows,
        }
    }

    fn position(&self, tickets_per: u32) -> Option<usize> {
        self.cohort_keys.iter().position(|&k| k == tickets_per)
    }
}
