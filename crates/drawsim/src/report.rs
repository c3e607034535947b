//! Rendering a published estimate for the terminal

use std::fmt::Write;

use drawsim_core::aggregate::round_to;
use drawsim_core::model::{CohortKey, PopulationSnapshot, PublishedEstimate};
use serde::Serialize;

use crate::error::ReportError;

/// Decimal places kept for per-applicant odds
const ODDS_PLACES: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub tickets_per: CohortKey,
    pub applicants: u64,
    pub entered: f64,
    pub waitlisted: f64,
    /// Chance that one applicant of the cohort is drawn in the primary phase
    pub entered_odds: f64,
    pub waitlisted_odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub trials: u64,
    pub primary_draws: u32,
    pub waitlist_draws: u32,
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn new(snapshot: &PopulationSnapshot, estimate: &PublishedEstimate) -> Self {
        let rows = estimate
            .rows
            .iter()
            .map(|row| {
                let applicants = match row.key {
                    CohortKey::Tickets(t) => {
                        snapshot.cohort(t).map_or(0, |c| u64::from(c.applicants))
                    }
                    CohortKey::Total => snapshot.total_applicants(),
                };
                ReportRow {
                    tickets_per: row.key,
                    applicants,
                    entered: row.entered,
                    waitlisted: row.waitlisted,
                    entered_odds: odds(row.entered, applicants),
                    waitlisted_odds: odds(row.waitlisted, applicants),
                }
            })
            .collect();

        let draws = snapshot.draws();
        Self {
            trials: estimate.trials,
            primary_draws: draws.primary_draws,
            waitlist_draws: draws.waitlist_draws,
            rows,
        }
    }

    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} trials, {} primary + {} waitlist draws",
            self.trials, self.primary_draws, self.waitlist_draws
        );
        let _ = writeln!(
            out,
            "{:>8} {:>11} {:>11} {:>11} {:>9} {:>9}",
            "tickets", "applicants", "entered", "waitlisted", "odds", "wl odds"
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{:>8} {:>11} {:>11.3} {:>11.3} {:>8.2}% {:>8.2}%",
                row.tickets_per.to_string(),
                row.applicants,
                row.entered,
                row.waitlisted,
                row.entered_odds * 100.0,
                row.waitlisted_odds * 100.0,
            );
        }
        out
    }

    pub fn to_yaml(&self) -> Result<String, ReportError> {
        serde_saphyr::to_string(self).map_err(|e| ReportError::Serialize(e.to_string()))
    }
}

fn odds(expected: f64, applicants: u64) -> f64 {
    if applicants == 0 {
        return 0.0;
    }
    round_to(expected / applicants as f64, ODDS_PLACES)
}
