//! Simulation run coordinator
//!
//! The [`Coordinator`] owns the worker pool and at most one live run. Each
//! [`Coordinator::request`] supersedes whatever was running, splits the trial target
//! across the workers and folds their batch summaries into a [`RunningEstimate`].
//! Rounded estimates are published on the update channel at most once per publish
//! interval while a run is in flight, and always once more when it completes.
//!
//! The coordinator is driven cooperatively: call [`Coordinator::pump`] from an event
//! loop, or [`Coordinator::run_to_completion`] to block until the current run ends.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};

use drawsim_core::aggregate::RunningEstimate;
use drawsim_core::model::{BatchSummary, PopulationSnapshot, PublishedEstimate};
use drawsim_core::pool::DrawLayout;

use crate::config::EngineConfig;
use crate::error::RunError;
use crate::pool::{WorkerPool, split_trials};
#[cfg(test)]
use crate::worker::{FaultKind, JobFault};
use crate::worker::{Job, RunId, WorkerEvent, WorkerId};

/// Longest a blocking wait sleeps before re-checking worker health
const MAX_WAIT: Duration = Duration::from_millis(50);

/// A published estimate for one run
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateUpdate {
    pub run_id: RunId,
    pub trials_completed: u64,
    pub target_trials: u64,
    pub estimate: PublishedEstimate,
    pub is_complete: bool,
}

impl EstimateUpdate {
    /// Fraction of the target completed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.target_trials == 0 {
            return 1.0;
        }
        self.trials_completed as f64 / self.target_trials as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Running,
    Complete,
    Cancelled,
    Failed(RunError),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Complete | RunState::Cancelled | RunState::Failed(_)
        )
    }
}

/// Snapshot of the current run's progress
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatus {
    pub run_id: RunId,
    pub state: RunState,
    pub trials_completed: u64,
    pub target_trials: u64,
    pub retries_used: u32,
}

/// One worker's part of a run
#[derive(Debug, Clone, Default)]
struct Share {
    assigned: u64,
    /// Trials merged from this worker across all attempts
    accepted: u64,
    complete: bool,
    attempts: u32,
}

impl Share {
    fn remaining(&self) -> u64 {
        self.assigned.saturating_sub(self.accepted)
    }
}

struct ActiveRun {
    id: RunId,
    target: u64,
    /// Released once the run reaches a terminal state
    layout: Option<Arc<DrawLayout>>,
    batch_size: u32,
    shares: Vec<Share>,
    estimate: RunningEstimate,
    state: RunState,
    retries_used: u32,
    /// Merged trials not yet published
    dirty: bool,
    last_publish: Option<Instant>,
}

/// Panic injection for crash-recovery tests
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fault {
    pub worker: WorkerId,
    pub after: u64,
    pub kind: FaultKind,
    /// Attempts of the share that crash; later attempts run clean
    pub attempts: u32,
}

pub struct Coordinator {
    config: EngineConfig,
    pool: WorkerPool,
    next_run: u64,
    run: Option<ActiveRun>,
    updates: Sender<EstimateUpdate>,
    latest: Option<EstimateUpdate>,
    #[cfg(test)]
    faults: Vec<Fault>,
}

impl Coordinator {
    /// Create a coordinator and the channel its estimates are published on
    pub fn new(config: EngineConfig) -> (Self, Receiver<EstimateUpdate>) {
        let (updates, receiver) = channel();
        let pool = WorkerPool::new(config.worker_count(), config.idle_timeout());
        tracing::debug!(workers = pool.size(), "Coordinator created");
        let coordinator = Self {
            config,
            pool,
            next_run: 1,
            run: None,
            updates,
            latest: None,
            #[cfg(test)]
            faults: Vec::new(),
        };
        (coordinator, receiver)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Start a run of `target_trials` trials over `snapshot`, superseding any run in
    /// flight. Nothing further is published for the superseded run.
    pub fn request(&mut self, snapshot: &PopulationSnapshot, target_trials: u64) -> RunId {
        self.stop("superseded");

        let run_id = RunId(self.next_run);
        self.next_run += 1;

        let layout = Arc::new(DrawLayout::new(snapshot, self.config.ticket_array_cap));
        let shares = split_trials(target_trials, self.pool.size());
        tracing::info!(
            run = %run_id,
            trials = target_trials,
            cohorts = layout.cohort_keys().len(),
            applicants = snapshot.total_applicants(),
            ticket_array = layout.uses_ticket_array(),
            "Starting simulation run"
        );

        self.latest = None;
        self.run = Some(ActiveRun {
            id: run_id,
            target: target_trials,
            estimate: RunningEstimate::new(layout.cohort_keys()),
            batch_size: self.config.batch_size_for(snapshot.total_applicants()),
            shares: shares
                .iter()
                .map(|&assigned| Share {
                    assigned,
                    complete: assigned == 0,
                    ..Default::default()
                })
                .collect(),
            layout: Some(layout),
            state: RunState::Running,
            retries_used: 0,
            dirty: false,
            last_publish: None,
        });
        self.pool.activate(run_id);

        for (worker, &assigned) in shares.iter().enumerate() {
            if assigned == 0 {
                continue;
            }
            if let Some(job) = self.job_for(worker, assigned)
                && let Err(e) = self.pool.dispatch(worker, job)
            {
                self.recover(worker, &e);
            }
        }
        self.finish_if_done();
        run_id
    }

    /// Cancel the current run. No estimate is published for it afterwards.
    pub fn cancel(&mut self) {
        self.stop("cancelled");
    }

    /// Process every pending worker event without blocking, recover shares whose
    /// thread died silently, publish if due, and tear down idle workers.
    pub fn pump(&mut self, now: Instant) {
        let finished = self.pool.finished_threads();
        while let Some(event) = self.pool.try_recv() {
            self.handle_event(event);
        }
        for (worker, (run_id, attempt)) in self.pool.reap_dead(&finished) {
            if self.is_current_attempt(worker, run_id, attempt) {
                self.recover(worker, "worker thread exited");
            }
        }

        let interval = self.config.publish_interval();
        let due = self.run.as_ref().is_some_and(|run| {
            run.state == RunState::Running
                && run.dirty
                && run
                    .last_publish
                    .is_none_or(|last| now.saturating_duration_since(last) >= interval)
        });
        if due {
            self.publish(now, false);
        }

        self.pool.reap_idle(now);
    }

    /// Block until the current run reaches a terminal state
    pub fn run_to_completion(&mut self) -> Result<EstimateUpdate, RunError> {
        let wait = self.config.publish_interval().clamp(Duration::from_millis(1), MAX_WAIT);
        loop {
            let Some(run) = self.run.as_ref() else {
                return Err(RunError::NoActiveRun);
            };
            match &run.state {
                RunState::Running | RunState::Idle => {}
                RunState::Complete => {
                    return self.latest.clone().ok_or(RunError::NoActiveRun);
                }
                RunState::Cancelled => return Err(RunError::Cancelled { run_id: run.id }),
                RunState::Failed(e) => return Err(e.clone()),
            }

            if let Some(event) = self.pool.recv_timeout(wait) {
                self.handle_event(event);
            }
            self.pump(Instant::now());
        }
    }

    /// State of the most recent run
    pub fn state(&self) -> RunState {
        self.run
            .as_ref()
            .map_or(RunState::Idle, |run| run.state.clone())
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.run.as_ref().map(|run| RunStatus {
            run_id: run.id,
            state: run.state.clone(),
            trials_completed: run.estimate.trials(),
            target_trials: run.target,
            retries_used: run.retries_used,
        })
    }

    /// Last estimate published for the current run
    pub fn latest(&self) -> Option<&EstimateUpdate> {
        self.latest.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn inject_fault(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    #[cfg(test)]
    pub(crate) fn clear_faults(&mut self) {
        self.faults.clear();
    }

    #[cfg(test)]
    pub(crate) fn event_sender(&self) -> Sender<WorkerEvent> {
        self.pool.event_sender()
    }

    fn stop(&mut self, reason: &str) {
        if let Some(run) = self.run.as_mut()
            && run.state == RunState::Running
        {
            tracing::info!(run = %run.id, trials = run.estimate.trials(), reason, "Run stopped");
            run.state = RunState::Cancelled;
            run.layout = None;
            self.pool.deactivate();
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if event.run_id() != run.id || run.state != RunState::Running {
            tracing::debug!(
                worker = event.worker(),
                run = %event.run_id(),
                "Dropping event for inactive run"
            );
            return;
        }
        if !self.is_current_attempt(event.worker(), event.run_id(), event.attempt()) {
            tracing::debug!(
                worker = event.worker(),
                attempt = event.attempt(),
                "Dropping event from replaced attempt"
            );
            return;
        }
        let Some(run) = self.run.as_mut() else {
            return;
        };

        match event {
            WorkerEvent::Batch {
                worker, summary, ..
            } => self.accept_batch(worker, &summary),
            WorkerEvent::Complete { worker, trials, .. } => {
                let Some(share) = run.shares.get_mut(worker) else {
                    return;
                };
                if share.remaining() > 0 {
                    let reason = format!(
                        "reported complete after {trials} trials with {} outstanding",
                        share.remaining()
                    );
                    self.recover(worker, &reason);
                    return;
                }
                share.complete = true;
                self.finish_if_done();
            }
            WorkerEvent::Aborted { worker, trials, .. } => {
                tracing::debug!(worker, run = %run.id, trials, "Worker aborted share");
            }
            WorkerEvent::Failed { worker, reason, .. } => self.recover(worker, &reason),
        }
    }

    fn accept_batch(&mut self, worker: WorkerId, summary: &BatchSummary) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let remaining = run.shares.get(worker).map_or(0, Share::remaining);
        if summary.trials > remaining {
            tracing::error!(
                run = %run.id,
                worker,
                trials = summary.trials,
                remaining,
                "Batch overruns worker share"
            );
            let run_id = run.id;
            self.fail(RunError::ShareOverrun {
                run_id,
                worker,
                trials: summary.trials,
                remaining,
            });
            return;
        }
        if let Err(source) = run.estimate.merge(summary) {
            tracing::error!(run = %run.id, worker, error = %source, "Inconsistent batch");
            let run_id = run.id;
            self.fail(RunError::Inconsistent { run_id, source });
            return;
        }
        if let Some(share) = run.shares.get_mut(worker) {
            share.accepted += summary.trials;
        }
        run.dirty = true;
    }

    /// Redispatch the unfinished part of a worker's share, or fail the run when the
    /// retry budget is spent.
    fn recover(&mut self, worker: WorkerId, reason: &str) {
        loop {
            let max_retries = self.config.max_retries;
            let Some(run) = self.run.as_mut() else {
                return;
            };
            if run.state != RunState::Running {
                return;
            }
            tracing::warn!(run = %run.id, worker, reason, "Worker failed");

            let Some(share) = run.shares.get_mut(worker) else {
                return;
            };
            let remaining = share.remaining();
            if remaining == 0 {
                share.complete = true;
                self.finish_if_done();
                return;
            }
            if run.retries_used >= max_retries {
                let run_id = run.id;
                self.fail(RunError::WorkersExhausted {
                    run_id,
                    retries: max_retries,
                });
                return;
            }
            run.retries_used += 1;
            share.attempts += 1;

            tracing::info!(worker, remaining, attempt = share.attempts, "Redispatching share");
            let Some(job) = self.job_for(worker, remaining) else {
                return;
            };
            match self.pool.dispatch(worker, job) {
                Ok(()) => return,
                Err(e) => tracing::warn!(worker, error = %e, "Redispatch failed"),
            }
        }
    }

    fn fail(&mut self, error: RunError) {
        if let Some(run) = self.run.as_mut() {
            tracing::error!(run = %run.id, error = %error, "Run failed");
            run.state = RunState::Failed(error);
            run.layout = None;
            self.pool.deactivate();
        }
    }

    fn finish_if_done(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.state != RunState::Running
            || !run.shares.iter().all(|s| s.complete)
            || run.estimate.trials() != run.target
        {
            return;
        }
        tracing::info!(run = %run.id, trials = run.target, retries = run.retries_used, "Run complete");
        run.state = RunState::Complete;
        run.layout = None;
        self.pool.deactivate();
        self.publish(Instant::now(), true);
    }

    fn publish(&mut self, now: Instant, is_complete: bool) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let update = EstimateUpdate {
            run_id: run.id,
            trials_completed: run.estimate.trials(),
            target_trials: run.target,
            estimate: run.estimate.rounded(self.config.decimal_places),
            is_complete,
        };
        run.dirty = false;
        run.last_publish = Some(now);
        tracing::trace!(run = %run.id, trials = update.trials_completed, "Publishing estimate");

        // A dropped receiver only means nobody is listening
        let _ = self.updates.send(update.clone());
        self.latest = Some(update);
    }

    fn job_for(&self, worker: WorkerId, trials: u64) -> Option<Job> {
        let run = self.run.as_ref()?;
        let layout = run.layout.clone()?;
        let attempt = run.shares.get(worker).map_or(0, |s| s.attempts);

        Some(Job {
            run_id: run.id,
            layout,
            trials,
            batch_size: run.batch_size,
            seed: self.config.seed,
            attempt,
            stream: stream_id(run.id, worker, attempt),
            #[cfg(test)]
            fault: self
                .faults
                .iter()
                .find(|f| f.worker == worker && attempt < f.attempts)
                .map(|f| JobFault {
                    after: f.after,
                    kind: f.kind,
                }),
        })
    }

    /// True when `attempt` is the live attempt of `worker`'s share in the running run
    fn is_current_attempt(&self, worker: WorkerId, run_id: RunId, attempt: u32) -> bool {
        self.run.as_ref().is_some_and(|run| {
            run.id == run_id
                && run.state == RunState::Running
                && run.shares.get(worker).is_some_and(|s| s.attempts == attempt)
        })
    }
}

/// RNG stream for one attempt of one worker's share
fn stream_id(run_id: RunId, worker: WorkerId, attempt: u32) -> u64 {
    (run_id.0 << 32) | ((worker as u64 & 0xFF_FFFF) << 8) | u64::from(attempt & 0xFF)
}
