//! Population description for a single draw year
//!
//! A population is an ordered list of cohorts. Every entrant in a cohort holds the
//! same number of tickets, and the ticket count doubles as the cohort's key.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::PopulationError;

/// Group of entrants sharing the same number of lottery tickets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    pub tickets_per: u32,
    pub applicants: u32,
}

impl Cohort {
    pub fn new(tickets_per: u32, applicants: u32) -> Self {
        Self {
            tickets_per,
            applicants,
        }
    }

    pub fn total_tickets(&self) -> u64 {
        u64::from(self.tickets_per) * u64::from(self.applicants)
    }
}

/// Number of winners pulled in each phase of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrawConfig {
    pub primary_draws: u32,
    #[serde(default)]
    pub waitlist_draws: u32,
}

impl DrawConfig {
    pub fn new(primary_draws: u32, waitlist_draws: u32) -> Self {
        Self {
            primary_draws,
            waitlist_draws,
        }
    }

    pub fn total_draws(&self) -> u64 {
        u64::from(self.primary_draws) + u64::from(self.waitlist_draws)
    }
}

/// Immutable, validated population for one simulation run.
///
/// Totals are computed once here so that workers can size their buffers
/// without walking the cohort list again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationSnapshot {
    cohorts: Vec<Cohort>,
    total_applicants: u64,
    total_tickets: u64,
    draws: DrawConfig,
}

impl PopulationSnapshot {
    pub fn new(cohorts: Vec<Cohort>, draws: DrawConfig) -> Result<Self, PopulationError> {
        let mut seen = FxHashMap::default();
        let mut total_applicants = 0u64;
        let mut total_tickets = 0u64;

        for (index, cohort) in cohorts.iter().enumerate() {
            if cohort.tickets_per == 0 {
                return Err(PopulationError::ZeroTickets { index });
            }
            if seen.insert(cohort.tickets_per, index).is_some() {
                return Err(PopulationError::DuplicateCohort {
                    tickets_per: cohort.tickets_per,
                });
            }
            total_applicants += u64::from(cohort.applicants);
            total_tickets = total_tickets
                .checked_add(cohort.total_tickets())
                .ok_or(PopulationError::TicketOverflow)?;
        }

        // Entrant indices are stored as u32 in the draw layout
        if total_applicants > u64::from(u32::MAX) {
            return Err(PopulationError::TicketOverflow);
        }

        Ok(Self {
            cohorts,
            total_applicants,
            total_tickets,
            draws,
        })
    }

    pub fn cohorts(&self) -> &[Cohort] {
        &self.cohorts
    }

    /// Cohort keys in population order
    pub fn cohort_keys(&self) -> Vec<u32> {
        self.cohorts.iter().map(|c| c.tickets_per).collect()
    }

    pub fn cohort(&self, tickets_per: u32) -> Option<&Cohort> {
        self.cohorts.iter().find(|c| c.tickets_per == tickets_per)
    }

    pub fn total_applicants(&self) -> u64 {
        self.total_applicants
    }

    pub fn total_tickets(&self) -> u64 {
        self.total_tickets
    }

    pub fn draws(&self) -> DrawConfig {
        self.draws
    }

    /// True when every entrant will be drawn in each trial
    pub fn is_exhausted_by_draws(&self) -> bool {
        self.draws.total_draws() >= self.total_applicants
    }
}
