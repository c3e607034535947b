//! Population inputs and simulation outputs

mod population;
mod results;

pub use population::{Cohort, DrawConfig, PopulationSnapshot};
pub use results::{BatchSummary, CohortKey, EstimateRow, PublishedEstimate, TrialOutcome};
