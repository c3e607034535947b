//! Trial outcomes, batch summaries and published estimate rows

use std::fmt;

use serde::{Serialize, Serializer};

/// Per-cohort win counts from a single trial, indexed by cohort position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialOutcome {
    entered: Vec<u32>,
    waitlisted: Vec<u32>,
}

impl TrialOutcome {
    pub fn new(cohorts: usize) -> Self {
        Self {
            entered: vec![0; cohorts],
            waitlisted: vec![0; cohorts],
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entered.fill(0);
        self.waitlisted.fill(0);
    }

    pub(crate) fn record_entered(&mut self, cohort: usize) {
        self.entered[cohort] += 1;
    }

    pub(crate) fn record_waitlisted(&mut self, cohort: usize) {
        self.waitlisted[cohort] += 1;
    }

    pub fn entered(&self) -> &[u32] {
        &self.entered
    }

    pub fn waitlisted(&self) -> &[u32] {
        &self.waitlisted
    }

    pub fn total_entered(&self) -> u64 {
        self.entered.iter().map(|&n| u64::from(n)).sum()
    }

    pub fn total_waitlisted(&self) -> u64 {
        self.waitlisted.iter().map(|&n| u64::from(n)).sum()
    }
}

/// Mean outcome per cohort over a block of trials run by one worker.
///
/// The cohort keys travel with the summary so the receiver can verify it was
/// produced for the population it is merging into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub cohort_keys: Vec<u32>,
    pub trials: u64,
    pub entered_mean: Vec<f64>,
    pub waitlisted_mean: Vec<f64>,
}

impl BatchSummary {
    pub fn is_empty(&self) -> bool {
        self.trials == 0
    }
}

/// Row identifier in a published estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CohortKey {
    Tickets(u32),
    Total,
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CohortKey::Tickets(n) => write!(f, "{n}"),
            CohortKey::Total => write!(f, "Total"),
        }
    }
}

impl Serialize for CohortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CohortKey::Tickets(n) => serializer.serialize_u32(*n),
            CohortKey::Total => serializer.serialize_str("Total"),
        }
    }
}

/// Expected winners for one cohort (or the Total row)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimateRow {
    #[serde(rename = "tickets_per")]
    pub key: CohortKey,
    pub entered: f64,
    pub waitlisted: f64,
}

/// Rounded view of a running estimate, ready to hand to a renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedEstimate {
    pub trials: u64,
    /// Cohort rows in population order, followed by the Total row
    pub rows: Vec<EstimateRow>,
}

impl PublishedEstimate {
    pub fn row(&self, key: CohortKey) -> Option<&EstimateRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    pub fn total(&self) -> Option<&EstimateRow> {
        self.row(CohortKey::Total)
    }
}
