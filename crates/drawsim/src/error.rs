use std::fmt;

use drawsim_core::error::{MergeError, PopulationError};

use crate::worker::RunId;

/// Errors reading or writing the engine config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Serialize(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO error: {msg}"),
            ConfigError::Parse(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::Serialize(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors rendering a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    Serialize(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Serialize(msg) => write!(f, "cannot render report: {msg}"),
        }
    }
}

impl std::error::Error for ReportError {}

/// Errors loading a population description
#[derive(Debug)]
pub enum PopulationFileError {
    Io(std::io::Error),
    Parse(String),
    Invalid(PopulationError),
    /// A `TICKETS:APPLICANTS` argument did not parse
    BadCohort(String),
}

impl fmt::Display for PopulationFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulationFileError::Io(e) => write!(f, "cannot read population: {e}"),
            PopulationFileError::Parse(msg) => write!(f, "malformed population: {msg}"),
            PopulationFileError::Invalid(e) => write!(f, "invalid population: {e}"),
            PopulationFileError::BadCohort(arg) => {
                write!(f, "expected TICKETS:APPLICANTS, got {arg:?}")
            }
        }
    }
}

impl std::error::Error for PopulationFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PopulationFileError::Io(e) => Some(e),
            PopulationFileError::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PopulationFileError {
    fn from(e: std::io::Error) -> Self {
        PopulationFileError::Io(e)
    }
}

impl From<PopulationError> for PopulationFileError {
    fn from(e: PopulationError) -> Self {
        PopulationFileError::Invalid(e)
    }
}

/// Ways a simulation run can end without a complete estimate
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    /// A worker reported a batch for a different cohort ordering
    Inconsistent { run_id: RunId, source: MergeError },
    /// Worker failures outlasted the retry budget
    WorkersExhausted { run_id: RunId, retries: u32 },
    /// A worker reported more trials than were left in its share
    ShareOverrun {
        run_id: RunId,
        worker: usize,
        trials: u64,
        remaining: u64,
    },
    /// The run was superseded or cancelled
    Cancelled { run_id: RunId },
    /// No run has been requested
    NoActiveRun,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Inconsistent { run_id, source } => {
                write!(f, "run {run_id} received an inconsistent batch: {source}")
            }
            RunError::WorkersExhausted { run_id, retries } => {
                write!(f, "run {run_id} failed after {retries} worker retries")
            }
            RunError::ShareOverrun {
                run_id,
                worker,
                trials,
                remaining,
            } => write!(
                f,
                "run {run_id} worker {worker} reported {trials} trials with {remaining} left in its share"
            ),
            RunError::Cancelled { run_id } => write!(f, "run {run_id} was cancelled"),
            RunError::NoActiveRun => write!(f, "no simulation run requested"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Inconsistent { source, .. } => Some(source),
            _ => None,
        }
    }
}
