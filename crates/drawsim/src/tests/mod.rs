//! Coordinator behavior with real worker threads
//!
//! Tests are organized by topic:
//! - `runs` - completion, supersession, cancellation and publication throttling
//! - `recovery` - worker crashes and silent exits, retry budget, inconsistent and oversized batches

mod recovery;
mod runs;

use std::sync::mpsc::Receiver;

use drawsim_core::model::{Cohort, DrawConfig, PopulationSnapshot};

use crate::config::EngineConfig;
use crate::coordinator::{Coordinator, EstimateUpdate};

fn snapshot(cohorts: &[(u32, u32)], primary: u32, waitlist: u32) -> PopulationSnapshot {
    PopulationSnapshot::new(
        cohorts.iter().map(|&(t, a)| Cohort::new(t, a)).collect(),
        DrawConfig::new(primary, waitlist),
    )
    .unwrap()
}

/// Tenure-weighted population large enough that a long run stays busy
fn large_snapshot() -> PopulationSnapshot {
    snapshot(
        &[(1, 3250), (2, 1447), (4, 914), (8, 549), (16, 315), (32, 126)],
        250,
        75,
    )
}

fn config(workers: usize) -> EngineConfig {
    EngineConfig {
        workers: Some(workers),
        publish_interval_ms: 0,
        seed: Some(17),
        ..Default::default()
    }
}

fn coordinator(config: EngineConfig) -> (Coordinator, Receiver<EstimateUpdate>) {
    Coordinator::new(config)
}
