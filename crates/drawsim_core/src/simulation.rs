//! Batched Monte Carlo estimation in-process
//!
//! [`estimate`] runs trials in fixed-size batches, in parallel with rayon when the
//! `parallel` feature is on, and folds the batch summaries into one
//! [`RunningEstimate`]. Streaming estimates with cancellation live in the `drawsim`
//! crate; both paths share [`run_batch`].

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::aggregate::{BatchAccumulator, RunningEstimate};
use crate::model::{BatchSummary, PopulationSnapshot};
use crate::pool::{DrawLayout, TicketPool};
use crate::trial::LotteryTrial;

const MAX_BATCH_SIZE: u64 = 100;

/// RNG for one independent stream of trials.
///
/// With a seed, each stream gets a distinct derived seed so results are reproducible for
/// a fixed partitioning. Without one, the stream is seeded from the thread RNG.
pub fn stream_rng(seed: Option<u64>, stream: u64) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => SmallRng::from_rng(&mut rand::rng()),
    }
}

/// Trials a worker runs between progress reports for a population of this size
pub fn reporting_batch_size(total_applicants: u64) -> u32 {
    match total_applicants {
        0..1_000 => 5,
        1_000..10_000 => 8,
        10_000..50_000 => 16,
        _ => 32,
    }
}

/// Run `trials` trials and summarize them, stopping early when `should_stop` returns
/// true at a trial boundary.
///
/// Returns the summary of the trials that did run; `None` if stopped before any.
pub fn run_batch<R: Rng>(
    trial: &mut LotteryTrial,
    accumulator: &mut BatchAccumulator,
    trials: u64,
    rng: &mut R,
    mut should_stop: impl FnMut() -> bool,
) -> Option<BatchSummary> {
    for _ in 0..trials {
        if should_stop() {
            break;
        }
        accumulator.record(trial.run(rng));
    }
    if accumulator.trials() == 0 {
        return None;
    }
    Some(accumulator.take_summary())
}

/// Estimate per-cohort outcomes over `num_trials` trials
pub fn estimate(
    snapshot: &PopulationSnapshot,
    num_trials: u64,
    seed: Option<u64>,
) -> RunningEstimate {
    let layout = Arc::new(DrawLayout::from_snapshot(snapshot));
    estimate_with_layout(&layout, num_trials, seed)
}

/// Same as [`estimate`] with a prebuilt layout
pub fn estimate_with_layout(
    layout: &Arc<DrawLayout>,
    num_trials: u64,
    seed: Option<u64>,
) -> RunningEstimate {
    let num_batches = num_trials.div_ceil(MAX_BATCH_SIZE);

    let simulate_batch = |i: u64| -> BatchSummary {
        let batch_size = if i == num_batches - 1 {
            num_trials - i * MAX_BATCH_SIZE
        } else {
            MAX_BATCH_SIZE
        };
        let mut rng = stream_rng(seed, i);
        let mut trial = LotteryTrial::new(TicketPool::new(layout.clone()));
        let mut accumulator = BatchAccumulator::new(layout.cohort_keys());
        for _ in 0..batch_size {
            accumulator.record(trial.run(&mut rng));
        }
        accumulator.take_summary()
    };

    #[cfg(feature = "parallel")]
    let batches: Vec<BatchSummary> = (0..num_batches).into_par_iter().map(simulate_batch).collect();
    #[cfg(not(feature = "parallel"))]
    let batches: Vec<BatchSummary> = (0..num_batches).map(simulate_batch).collect();

    let mut estimate = RunningEstimate::new(layout.cohort_keys());
    for batch in &batches {
        // Every batch is built from this layout's keys
        if let Err(e) = estimate.merge(batch) {
            debug_assert!(false, "{e}");
        }
    }
    estimate
}
