//! Background worker thread running lottery trials for one run at a time.
//!
//! A worker receives [`WorkerCommand::Start`] jobs, runs its share of trials in small
//! batches and reports each batch as a [`WorkerEvent::Batch`]. Between trials it checks
//! the pool-wide active run id; once that no longer matches its job the worker drops the
//! partial batch, reports [`WorkerEvent::Aborted`] and waits for the next command.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use drawsim_core::aggregate::BatchAccumulator;
use drawsim_core::model::BatchSummary;
use drawsim_core::pool::{DrawLayout, TicketPool};
use drawsim_core::simulation::{run_batch, stream_rng};
use drawsim_core::trial::LotteryTrial;

pub type WorkerId = usize;

/// Identifier of one simulation request; never reused by a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Active-run value meaning "no run accepted"
pub(crate) const NO_RUN: u64 = 0;

/// Trials assigned to one worker for one run
#[derive(Debug, Clone)]
pub struct Job {
    pub run_id: RunId,
    pub layout: Arc<DrawLayout>,
    pub trials: u64,
    pub batch_size: u32,
    pub seed: Option<u64>,
    /// Redispatch count of this share; events carry it back
    pub attempt: u32,
    /// RNG stream, distinct per worker and attempt
    pub stream: u64,
    #[cfg(test)]
    pub fault: Option<JobFault>,
}

/// How an injected fault ends a job
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaultKind {
    Panic,
    /// The thread exits without reporting anything further
    Exit,
}

/// Fault triggered once `after` trials have been reported
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct JobFault {
    pub after: u64,
    pub kind: FaultKind,
}

#[derive(Debug)]
pub enum WorkerCommand {
    Start(Job),
    Shutdown,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Batch {
        worker: WorkerId,
        run_id: RunId,
        attempt: u32,
        summary: BatchSummary,
    },
    /// The whole share was reported
    Complete {
        worker: WorkerId,
        run_id: RunId,
        attempt: u32,
        trials: u64,
    },
    /// The run was superseded before the share finished
    Aborted {
        worker: WorkerId,
        run_id: RunId,
        attempt: u32,
        trials: u64,
    },
    /// The job panicked; the worker thread has exited
    Failed {
        worker: WorkerId,
        run_id: RunId,
        attempt: u32,
        reason: String,
    },
}

impl WorkerEvent {
    pub fn worker(&self) -> WorkerId {
        match self {
            WorkerEvent::Batch { worker, .. }
            | WorkerEvent::Complete { worker, .. }
            | WorkerEvent::Aborted { worker, .. }
            | WorkerEvent::Failed { worker, .. } => *worker,
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            WorkerEvent::Batch { run_id, .. }
            | WorkerEvent::Complete { run_id, .. }
            | WorkerEvent::Aborted { run_id, .. }
            | WorkerEvent::Failed { run_id, .. } => *run_id,
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            WorkerEvent::Batch { attempt, .. }
            | WorkerEvent::Complete { attempt, .. }
            | WorkerEvent::Aborted { attempt, .. }
            | WorkerEvent::Failed { attempt, .. } => *attempt,
        }
    }

    /// True when the worker is no longer busy with the event's run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Batch { .. })
    }
}

/// Owning handle to a worker thread
pub struct WorkerHandle {
    commands: Sender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a worker thread reporting to `events`
    pub fn spawn(
        id: WorkerId,
        events: Sender<WorkerEvent>,
        active_run: Arc<AtomicU64>,
    ) -> std::io::Result<Self> {
        let (commands, command_rx) = channel();
        let ctx = WorkerContext {
            id,
            events,
            active_run,
        };
        let thread = thread::Builder::new()
            .name(format!("drawsim-worker-{id}"))
            .spawn(move || ctx.run(command_rx))?;

        Ok(Self {
            commands,
            thread: Some(thread),
        })
    }

    /// Hand a job to the worker. Returns false if the thread is gone.
    pub fn start(&self, job: Job) -> bool {
        self.commands.send(WorkerCommand::Start(job)).is_ok()
    }

    /// True once the thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// State owned by the worker thread
struct WorkerContext {
    id: WorkerId,
    events: Sender<WorkerEvent>,
    active_run: Arc<AtomicU64>,
}

impl WorkerContext {
    fn run(&self, commands: Receiver<WorkerCommand>) {
        while let Ok(command) = commands.recv() {
            let job = match command {
                WorkerCommand::Shutdown => break,
                WorkerCommand::Start(job) => job,
            };
            let run_id = job.run_id;

            match panic::catch_unwind(AssertUnwindSafe(|| self.run_job(&job))) {
                Ok(true) => {}
                Ok(false) => break,
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    tracing::error!(worker = self.id, run = %run_id, reason = %reason, "Worker crashed");
                    let _ = self.events.send(WorkerEvent::Failed {
                        worker: self.id,
                        run_id,
                        attempt: job.attempt,
                        reason,
                    });
                    break;
                }
            }
        }
        tracing::debug!(worker = self.id, "Worker thread exiting");
    }

    fn is_current(&self, run_id: RunId) -> bool {
        self.active_run.load(Ordering::Acquire) == run_id.0
    }

    /// Run one share. Returns false when the thread should exit.
    fn run_job(&self, job: &Job) -> bool {
        let run_id = job.run_id;
        let attempt = job.attempt;
        tracing::debug!(worker = self.id, run = %run_id, trials = job.trials, "Starting share");

        let mut trial = LotteryTrial::new(TicketPool::new(job.layout.clone()));
        let mut accumulator = BatchAccumulator::new(job.layout.cohort_keys());
        let mut rng = stream_rng(job.seed, job.stream);
        let mut reported = 0u64;

        while reported < job.trials {
            #[cfg(test)]
            if !survives_fault(job, reported) {
                return false;
            }

            let batch = (job.trials - reported).min(u64::from(job.batch_size));
            let summary = run_batch(&mut trial, &mut accumulator, batch, &mut rng, || {
                !self.is_current(run_id)
            });

            if !self.is_current(run_id) {
                tracing::debug!(worker = self.id, run = %run_id, reported, "Share superseded");
                let _ = self.events.send(WorkerEvent::Aborted {
                    worker: self.id,
                    run_id,
                    attempt,
                    trials: reported,
                });
                return true;
            }

            let Some(summary) = summary else {
                break;
            };
            reported += summary.trials;
            let event = WorkerEvent::Batch {
                worker: self.id,
                run_id,
                attempt,
                summary,
            };
            if self.events.send(event).is_err() {
                // Coordinator is gone; nobody to report to
                return true;
            }
        }

        #[cfg(test)]
        if !survives_fault(job, reported) {
            return false;
        }

        let _ = self.events.send(WorkerEvent::Complete {
            worker: self.id,
            run_id,
            attempt,
            trials: reported,
        });
        true
    }
}

/// Trigger an injected fault once `reported` trials are in. False means exit silently.
#[cfg(test)]
fn survives_fault(job: &Job, reported: u64) -> bool {
    match job.fault {
        Some(fault) if reported >= fault.after => match fault.kind {
            FaultKind::Panic => panic!("injected fault after {reported} trials"),
            FaultKind::Exit => false,
        },
        _ => true,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
