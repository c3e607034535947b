//! Statistical and aggregation properties of the draw engine
//!
//! Tests are organized by topic:
//! - `aggregation` - merge order and batching do not change the running mean
//! - `draws` - weighted sampling bias and population exhaustion
//! - `end_to_end` - full trials checked against hand-computable totals

mod aggregation;

use std::sync::Arc;

use crate::model::{Cohort, DrawConfig, PopulationSnapshot};
use crate::pool::{DrawLayout, TicketPool};
use crate::trial::LotteryTrial;

fn snapshot(cohorts: &[(u32, u32)], primary: u32, waitlist: u32) -> PopulationSnapshot {
    PopulationSnapshot::new(
        cohorts.iter().map(|&(t, a)| Cohort::new(t, a)).collect(),
        DrawConfig::new(primary, waitlist),
    )
    .unwrap()
}

fn trial_with_cap(snapshot: &PopulationSnapshot, cap: u64) -> LotteryTrial {
    LotteryTrial::new(TicketPool::new(Arc::new(DrawLayout::new(snapshot, cap))))
}
