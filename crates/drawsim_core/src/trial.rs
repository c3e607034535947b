//! A single simulated lottery: primary draws followed by waitlist draws.

use rand::Rng;

use crate::model::TrialOutcome;
use crate::pool::TicketPool;

/// Reusable trial runner owning its pool and outcome buffer
#[derive(Debug, Clone)]
pub struct LotteryTrial {
    pool: TicketPool,
    outcome: TrialOutcome,
}

impl LotteryTrial {
    pub fn new(pool: TicketPool) -> Self {
        let outcome = TrialOutcome::new(pool.layout().cohort_keys().len());
        Self { pool, outcome }
    }

    /// Run one trial with the draw counts recorded in the layout.
    ///
    /// The returned outcome is overwritten by the next call.
    pub fn run<R: Rng>(&mut self, rng: &mut R) -> &TrialOutcome {
        let draws = self.pool.layout().draws();
        run_trial(
            &mut self.pool,
            draws.primary_draws,
            draws.waitlist_draws,
            rng,
            &mut self.outcome,
        );
        &self.outcome
    }

    pub fn pool(&self) -> &TicketPool {
        &self.pool
    }
}

/// Reset `pool` and draw `primary_draws` entrants followed by `waitlist_draws` more.
///
/// Draws stop early once the pool is exhausted, so a population smaller than the
/// requested draw count has every entrant drawn exactly once.
pub fn run_trial<R: Rng>(
    pool: &mut TicketPool,
    primary_draws: u32,
    waitlist_draws: u32,
    rng: &mut R,
    outcome: &mut TrialOutcome,
) {
    pool.reset();
    outcome.clear();

    for _ in 0..primary_draws {
        let Some(winner) = pool.draw(rng) else {
            return;
        };
        outcome.record_entered(pool.layout().cohort_of(winner));
    }

    for _ in 0..waitlist_draws {
        let Some(winner) = pool.draw(rng) else {
            return;
        };
        outcome.record_waitlisted(pool.layout().cohort_of(winner));
    }
}
