//! Weighted draw without replacement
//!
//! A [`DrawLayout`] flattens a population into per-entrant arrays once per run and is
//! shared read-only between workers. Each worker owns a [`TicketPool`], the mutable
//! per-trial copy of the remaining ticket weights.
//!
//! Two selection strategies are available and draw from the same distribution:
//! - **Scan**: pick a uniform ticket among the remaining ones and walk the entrants
//!   accumulating weight until the running sum passes it. O(entrants) per draw.
//! - **Ticket array**: one slot per ticket mapping to its entrant. A uniform slot is
//!   drawn and redrawn if its entrant already won. O(1) expected while most tickets are
//!   still live, so the pool switches to the scan once fewer than a quarter remain.
//!
//! The ticket array is only materialized when the population's total ticket count is at
//! or below the allocation cap.

use std::sync::Arc;

use rand::Rng;

use crate::model::{DrawConfig, PopulationSnapshot};

/// Default upper bound on ticket-array slots (128 MiB of `u32`)
pub const DEFAULT_TICKET_ARRAY_CAP: u64 = 1 << 25;

/// Below this live fraction (1 / N) of the tickets the rejection draw is abandoned
const REJECTION_LIVE_FRACTION: u64 = 4;

/// Immutable per-entrant view of a population
#[derive(Debug)]
pub struct DrawLayout {
    /// Entrant -> ticket weight
    weights: Vec<u32>,
    /// Entrant -> cohort position
    cohort_of: Vec<u32>,
    /// Ticket -> entrant, when under the allocation cap
    tickets: Option<Vec<u32>>,
    cohort_keys: Vec<u32>,
    total_tickets: u64,
    draws: DrawConfig,
}

impl DrawLayout {
    pub fn new(snapshot: &PopulationSnapshot, ticket_array_cap: u64) -> Self {
        let entrants = snapshot.total_applicants() as usize;
        let mut weights = Vec::with_capacity(entrants);
        let mut cohort_of = Vec::with_capacity(entrants);

        for (position, cohort) in snapshot.cohorts().iter().enumerate() {
            for _ in 0..cohort.applicants {
                weights.push(cohort.tickets_per);
                cohort_of.push(position as u32);
            }
        }

        let tickets = (snapshot.total_tickets() <= ticket_array_cap).then(|| {
            let mut tickets = Vec::with_capacity(snapshot.total_tickets() as usize);
            for (entrant, &weight) in weights.iter().enumerate() {
                tickets.extend(std::iter::repeat_n(entrant as u32, weight as usize));
            }
            tickets
        });

        Self {
            weights,
            cohort_of,
            tickets,
            cohort_keys: snapshot.cohort_keys(),
            total_tickets: snapshot.total_tickets(),
            draws: snapshot.draws(),
        }
    }

    pub fn from_snapshot(snapshot: &PopulationSnapshot) -> Self {
        Self::new(snapshot, DEFAULT_TICKET_ARRAY_CAP)
    }

    pub fn entrants(&self) -> usize {
        self.weights.len()
    }

    pub fn cohort_of(&self, entrant: usize) -> usize {
        self.cohort_of[entrant] as usize
    }

    pub fn cohort_keys(&self) -> &[u32] {
        &self.cohort_keys
    }

    pub fn total_tickets(&self) -> u64 {
        self.total_tickets
    }

    pub fn draws(&self) -> DrawConfig {
        self.draws
    }

    pub fn uses_ticket_array(&self) -> bool {
        self.tickets.is_some()
    }
}

/// Mutable draw state for one trial at a time
#[derive(Debug, Clone)]
pub struct TicketPool {
    layout: Arc<DrawLayout>,
    remaining: Vec<u32>,
    remaining_tickets: u64,
    eligible: usize,
}

impl TicketPool {
    pub fn new(layout: Arc<DrawLayout>) -> Self {
        let remaining = layout.weights.clone();
        let remaining_tickets = layout.total_tickets;
        let eligible = layout.entrants();
        Self {
            layout,
            remaining,
            remaining_tickets,
            eligible,
        }
    }

    /// Restore every entrant to the pool
    pub fn reset(&mut self) {
        self.remaining.copy_from_slice(&self.layout.weights);
        self.remaining_tickets = self.layout.total_tickets;
        self.eligible = self.layout.entrants();
    }

    pub fn layout(&self) -> &DrawLayout {
        &self.layout
    }

    /// Entrants that can still be drawn
    pub fn eligible(&self) -> usize {
        self.eligible
    }

    pub fn remaining_tickets(&self) -> u64 {
        self.remaining_tickets
    }

    /// Draw one entrant with probability proportional to its tickets and remove it.
    ///
    /// Returns `None` once the pool is empty.
    pub fn draw<R: Rng>(&mut self, rng: &mut R) -> Option<usize> {
        if self.remaining_tickets == 0 {
            return None;
        }

        let live_enough =
            self.remaining_tickets * REJECTION_LIVE_FRACTION >= self.layout.total_tickets;
        let winner = match &self.layout.tickets {
            Some(tickets) if live_enough => self.pick_from_tickets(tickets, rng),
            _ => self.pick_by_scan(rng)?,
        };

        self.take(winner);
        Some(winner)
    }

    fn pick_from_tickets<R: Rng>(&self, tickets: &[u32], rng: &mut R) -> usize {
        loop {
            let slot = rng.random_range(0..tickets.len());
            let entrant = tickets[slot] as usize;
            if self.remaining[entrant] != 0 {
                return entrant;
            }
        }
    }

    fn pick_by_scan<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        let mut pulled = rng.random_range(0..self.remaining_tickets);
        for (entrant, &weight) in self.remaining.iter().enumerate() {
            let weight = u64::from(weight);
            if pulled < weight {
                return Some(entrant);
            }
            pulled -= weight;
        }
        debug_assert!(false, "remaining ticket total out of sync with weights");
        None
    }

    fn take(&mut self, entrant: usize) {
        self.remaining_tickets -= u64::from(self.remaining[entrant]);
        self.remaining[entrant] = 0;
        self.eligible -= 1;
    }
}
