//! Population files and command-line cohorts
//!
//! ```yaml
//! primary_draws: 250
//! waitlist_draws: 75
//! cohorts:
//!   - tickets_per: 1
//!     applicants: 3250
//!   - tickets_per: 2
//!     applicants: 1447
//! ```

use std::path::Path;

use drawsim_core::model::{Cohort, DrawConfig, PopulationSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::PopulationFileError;

pub const DEFAULT_PRIMARY_DRAWS: u32 = 250;
pub const DEFAULT_WAITLIST_DRAWS: u32 = 75;

fn default_primary_draws() -> u32 {
    DEFAULT_PRIMARY_DRAWS
}

fn default_waitlist_draws() -> u32 {
    DEFAULT_WAITLIST_DRAWS
}

/// On-disk description of one draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationFile {
    pub cohorts: Vec<Cohort>,
    #[serde(default = "default_primary_draws")]
    pub primary_draws: u32,
    #[serde(default = "default_waitlist_draws")]
    pub waitlist_draws: u32,
}

impl PopulationFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, PopulationFileError> {
        serde_saphyr::from_str(yaml).map_err(|e| PopulationFileError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, PopulationFileError> {
        let content = std::fs::read_to_string(path)?;
        let file = Self::from_yaml(&content)?;
        tracing::debug!(
            path = %path.display(),
            cohorts = file.cohorts.len(),
            "Loaded population file"
        );
        Ok(file)
    }

    pub fn draws(&self) -> DrawConfig {
        DrawConfig::new(self.primary_draws, self.waitlist_draws)
    }

    /// Validate into a snapshot the engine can run
    pub fn to_snapshot(&self) -> Result<PopulationSnapshot, PopulationFileError> {
        Ok(PopulationSnapshot::new(self.cohorts.clone(), self.draws())?)
    }
}

/// Parse a `TICKETS:APPLICANTS` pair such as `4:549`
pub fn parse_cohort(arg: &str) -> Result<Cohort, PopulationFileError> {
    let bad = || PopulationFileError::BadCohort(arg.to_string());
    let (tickets, applicants) = arg.split_once(':').ok_or_else(bad)?;
    let tickets_per = tickets.trim().parse().map_err(|_| bad())?;
    let applicants = applicants.trim().parse().map_err(|_| bad())?;
    Ok(Cohort::new(tickets_per, applicants))
}
