use std::fmt;

/// Errors raised while building a population snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationError {
    /// A cohort declared zero tickets per applicant
    ZeroTickets { index: usize },
    /// Two cohorts share the same `tickets_per` key
    DuplicateCohort { tickets_per: u32 },
    /// The total ticket count does not fit the draw arithmetic
    TicketOverflow,
}

impl fmt::Display for PopulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulationError::ZeroTickets { index } => {
                write!(f, "cohort #{index} has zero tickets per applicant")
            }
            PopulationError::DuplicateCohort { tickets_per } => {
                write!(f, "more than one cohort holds {tickets_per} tickets per applicant")
            }
            PopulationError::TicketOverflow => write!(f, "total ticket count overflows"),
        }
    }
}

impl std::error::Error for PopulationError {}

/// Errors raised when folding a batch summary into a running estimate
#[derive(Debug, Clone, PartialEq)]
pub enum MergeError {
    /// The batch was produced for a different cohort ordering
    CohortMismatch {
        expected: Vec<u32>,
        found: Vec<u32>,
    },
    /// Mean vectors do not line up with the cohort keys
    MalformedBatch { cohorts: usize, values: usize },
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::CohortMismatch { expected, found } => {
                write!(f, "batch cohorts {found:?} do not match estimate cohorts {expected:?}")
            }
            MergeError::MalformedBatch { cohorts, values } => {
                write!(f, "batch carries {values} values for {cohorts} cohorts")
            }
        }
    }
}

impl std::error::Error for MergeError {}
