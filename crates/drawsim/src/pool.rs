//! Fixed-size pool of persistent worker threads
//!
//! Workers are spawned lazily the first time a slot receives a job and are kept for
//! later runs. When no slot has been busy for the idle timeout, every thread is shut
//! down; the next dispatch spawns them again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::time::{Duration, Instant};

use crate::worker::{Job, NO_RUN, RunId, WorkerEvent, WorkerHandle, WorkerId};

/// Job a worker was last handed: run and attempt of the share
pub type Assignment = (RunId, u32);

struct WorkerSlot {
    handle: WorkerHandle,
    /// Spawn counter value, unique per thread
    generation: u64,
    /// Job the worker is currently busy with
    assigned: Option<Assignment>,
}

pub struct WorkerPool {
    slots: Vec<Option<WorkerSlot>>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    active_run: Arc<AtomicU64>,
    idle_timeout: Duration,
    idle_since: Option<Instant>,
    spawned: u64,
}

impl WorkerPool {
    pub fn new(size: usize, idle_timeout: Duration) -> Self {
        let (events_tx, events_rx) = channel();
        Self {
            slots: (0..size.max(1)).map(|_| None).collect(),
            events_tx,
            events_rx,
            active_run: Arc::new(AtomicU64::new(NO_RUN)),
            idle_timeout,
            idle_since: None,
            spawned: 0,
        }
    }

    /// Number of worker slots
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Worker threads currently alive
    pub fn live_workers(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Workers that have not yet reported a terminal event for their job
    pub fn busy_workers(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.assigned.is_some())
            .count()
    }

    /// Make `run_id` the only run whose trials workers keep running
    pub fn activate(&self, run_id: RunId) {
        self.active_run.store(run_id.0, Ordering::Release);
    }

    /// Stop accepting work for any run; busy workers abort at their next trial
    pub fn deactivate(&self) {
        self.active_run.store(NO_RUN, Ordering::Release);
    }

    pub fn active_run(&self) -> Option<RunId> {
        match self.active_run.load(Ordering::Acquire) {
            NO_RUN => None,
            id => Some(RunId(id)),
        }
    }

    /// Send a job to a worker slot, spawning its thread if needed
    pub fn dispatch(&mut self, worker: WorkerId, job: Job) -> Result<(), String> {
        let assignment = (job.run_id, job.attempt);
        let (events_tx, active_run) = (self.events_tx.clone(), self.active_run.clone());
        let generation = self.spawned + 1;
        let slot = self.slot_mut(worker)?;
        if slot.as_ref().is_some_and(|s| s.handle.is_finished()) {
            *slot = None;
        }
        let mut spawned = false;
        if slot.is_none() {
            let handle = WorkerHandle::spawn(worker, events_tx, active_run)
                .map_err(|e| format!("failed to spawn worker {worker}: {e}"))?;
            tracing::debug!(worker, generation, "Spawned worker");
            *slot = Some(WorkerSlot {
                handle,
                generation,
                assigned: None,
            });
            spawned = true;
        }

        let Some(slot) = slot.as_mut() else {
            return Err(format!("worker {worker} unavailable"));
        };
        if !slot.handle.start(job) {
            return Err(format!("worker {worker} stopped accepting jobs"));
        }
        slot.assigned = Some(assignment);
        if spawned {
            self.spawned = generation;
        }
        self.idle_since = None;
        Ok(())
    }

    pub fn try_recv(&mut self) -> Option<WorkerEvent> {
        let event = self.events_rx.try_recv().ok()?;
        self.note(&event);
        Some(event)
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<WorkerEvent> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.note(&event);
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Threads that have exited, identified by slot and generation.
    ///
    /// Take this before draining events: every event those threads sent is then already
    /// queued, so [`WorkerPool::reap_dead`] can trust what is still assigned afterwards.
    pub fn finished_threads(&self) -> Vec<(WorkerId, u64)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(worker, slot)| {
                slot.as_ref()
                    .filter(|s| s.handle.is_finished())
                    .map(|s| (worker, s.generation))
            })
            .collect()
    }

    /// Remove threads from `finished` that are still in their slot, returning the jobs
    /// they were busy with. Call after draining the events queued before `finished` was
    /// taken; those jobs will never report.
    pub fn reap_dead(&mut self, finished: &[(WorkerId, u64)]) -> Vec<(WorkerId, Assignment)> {
        let mut dead = Vec::new();
        for &(worker, generation) in finished {
            let Some(slot) = self.slots.get_mut(worker) else {
                continue;
            };
            if slot.as_ref().is_none_or(|s| s.generation != generation) {
                continue;
            }
            if let Some(WorkerSlot {
                assigned: Some(assignment),
                ..
            }) = slot.take()
            {
                dead.push((worker, assignment));
            }
        }
        if !dead.is_empty() {
            self.mark_idle_if_quiet(Instant::now());
        }
        dead
    }

    /// Shut every worker down once the pool has been quiet for the idle timeout.
    ///
    /// Returns the number of threads torn down.
    pub fn reap_idle(&mut self, now: Instant) -> usize {
        let Some(since) = self.idle_since else {
            return 0;
        };
        if now.saturating_duration_since(since) < self.idle_timeout {
            return 0;
        }
        let live = self.live_workers();
        if live > 0 {
            tracing::info!(workers = live, "Tearing down idle workers");
        }
        // Dropping a handle shuts its thread down and joins it
        self.slots.iter_mut().for_each(|s| *s = None);
        self.idle_since = None;
        live
    }

    #[cfg(test)]
    pub(crate) fn event_sender(&self) -> Sender<WorkerEvent> {
        self.events_tx.clone()
    }

    fn slot_mut(&mut self, worker: WorkerId) -> Result<&mut Option<WorkerSlot>, String> {
        let size = self.slots.len();
        self.slots
            .get_mut(worker)
            .ok_or_else(|| format!("worker {worker} out of range for pool of {size}"))
    }

    fn note(&mut self, event: &WorkerEvent) {
        if !event.is_terminal() {
            return;
        }
        let worker = event.worker();
        let Some(slot) = self.slots.get_mut(worker) else {
            return;
        };
        let current = slot
            .as_ref()
            .is_some_and(|s| s.assigned == Some((event.run_id(), event.attempt())));
        if !current {
            // The slot has moved on to a later job, possibly on a fresh thread
            return;
        }
        if matches!(event, WorkerEvent::Failed { .. }) {
            // The thread exits after a failure
            *slot = None;
        } else if let Some(s) = slot.as_mut() {
            s.assigned = None;
        }
        self.mark_idle_if_quiet(Instant::now());
    }

    fn mark_idle_if_quiet(&mut self, now: Instant) {
        if self.busy_workers() == 0 && self.idle_since.is_none() {
            self.idle_since = Some(now);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.deactivate();
        self.slots.clear();
    }
}

/// Split `total` trials into `parts` shares differing by at most one.
///
/// Earlier shares take the remainder.
pub fn split_trials(total: u64, parts: usize) -> Vec<u64> {
    let parts = parts.max(1) as u64;
    let base = total / parts;
    let extra = total % parts;
    (0..parts).map(|i| base + u64::from(i < extra)).collect()
}
