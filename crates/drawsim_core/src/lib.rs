//! Monte Carlo engine for weighted allocation lotteries
//!
//! Entrants are grouped into cohorts by how many tickets each holds. Every trial draws a
//! fixed number of primary winners and then waitlist winners without replacement, with
//! each draw weighted by tickets. Repeating trials and averaging gives the expected
//! number of winners per cohort.
//!
//! - [`pool`]: flattened population and the weighted draw
//! - [`trial`]: one full primary + waitlist draw sequence
//! - [`aggregate`]: batch summaries and the incremental running mean
//! - [`simulation`]: batched in-process estimation
//!
//! ```
//! use drawsim_core::model::{Cohort, DrawConfig, PopulationSnapshot};
//! use drawsim_core::simulation::estimate;
//!
//! let snapshot = PopulationSnapshot::new(
//!     vec![Cohort::new(1, 100), Cohort::new(2, 50)],
//!     DrawConfig::new(50, 0),
//! )
//! .unwrap();
//! let estimate = estimate(&snapshot, 200, Some(42));
//! assert!((estimate.total_entered() - 50.0).abs() < 1e-9);
//! ```

#![warn(clippy::all)]

pub mod aggregate;
pub mod error;
pub mod model;
pub mod pool;
pub mod simulation;
pub mod trial;

#[cfg(test)]
mod tests;

pub use aggregate::{BatchAccumulator, RunningEstimate};
pub use model::{Cohort, DrawConfig, PopulationSnapshot};
pub use pool::{DrawLayout, TicketPool};
pub use trial::LotteryTrial;
