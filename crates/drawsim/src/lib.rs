//! Streaming lottery odds estimation
//!
//! Runs `drawsim_core` trials on a pool of persistent worker threads and publishes
//! progressively refined estimates:
//! - Lazily spawned workers that are reused across runs and torn down when idle
//! - Supersession: a new request cancels the run in flight at the next trial boundary
//! - Throttled publication of rounded estimates with a guaranteed final update
//! - Recovery from worker crashes by redispatching the unfinished share
//! - YAML engine config and population files, terminal reports

// ============================================================================
// Engine
// ============================================================================

pub mod coordinator;
pub mod pool;
pub mod worker;

// ============================================================================
// Configuration, input and output
// ============================================================================

pub mod config;
pub mod error;
pub mod logging;
pub mod population;
pub mod report;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::EngineConfig;
pub use coordinator::{Coordinator, EstimateUpdate, RunState, RunStatus};
pub use error::{ConfigError, PopulationFileError, ReportError, RunError};
pub use logging::{LogTarget, init_logging};
pub use population::{PopulationFile, parse_cohort};
pub use report::Report;
pub use worker::RunId;
