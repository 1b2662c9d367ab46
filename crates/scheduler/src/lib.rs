//! Background compilation queue for effect reloads.
//!
//! The scheduler moves through three states:
//!
//! ```text
//!   Idle ──enqueue──▶ Queued ──dispatch──▶ Draining ──last completion──▶ Idle
//! ```
//!
//! `remaining` is shared with the worker threads and holds `IDLE` (the
//! "not loading" sentinel) whenever no batch is in flight. Workers decrement it
//! once per finished job, whether the job succeeded, failed, or panicked, so a
//! batch always drains back to idle.
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, warn};

/// Value of the remaining counter while no reload is running.
pub const IDLE: usize = usize::MAX;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to spawn compile worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("compile job for effect {0} panicked")]
    WorkerPanicked(usize),
    #[error("reload already in progress ({remaining} effects remaining)")]
    Busy { remaining: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// Nothing queued and no batch in flight.
    Idle,
    /// Effects are waiting for the next dispatch.
    Queued,
    /// Workers are compiling a batch.
    Draining,
}

/// One finished job, tagged with the effect index it was queued under.
#[derive(Debug)]
pub struct Completion<R> {
    pub index: usize,
    pub outcome: Result<R, SchedulerError>,
}

/// Completions collected by `poll` or `wait`.
#[derive(Debug)]
pub struct Drained<R> {
    pub completions: Vec<Completion<R>>,
    /// Set when this call observed the last completion of the batch.
    pub finished: bool,
}

impl<R> Default for Drained<R> {
    fn default() -> Self {
        Self {
            completions: Vec::new(),
            finished: false,
        }
    }
}

/// Number of workers used when the caller has no preference.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

pub struct ReloadScheduler<R> {
    queue: Vec<usize>,
    remaining: Arc<AtomicUsize>,
    total: usize,
    dispatched: usize,
    completed: usize,
    results: Option<Receiver<Completion<R>>>,
    workers: Vec<JoinHandle<()>>,
}

impl<R> Default for ReloadScheduler<R> {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            remaining: Arc::new(AtomicUsize::new(IDLE)),
            total: 0,
            dispatched: 0,
            completed: 0,
            results: None,
            workers: Vec::new(),
        }
    }
}

impl<R: Send + 'static> ReloadScheduler<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReloadState {
        if self.is_loading() {
            ReloadState::Draining
        } else if self.queue.is_empty() {
            ReloadState::Idle
        } else {
            ReloadState::Queued
        }
    }

    /// True while a dispatched batch has not fully drained.
    pub fn is_loading(&self) -> bool {
        self.remaining.load(Ordering::Acquire) != IDLE
    }

    /// Jobs of the current batch that have not completed yet, or `IDLE`.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> &[usize] {
        &self.queue
    }

    pub fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Effects queued since the last `reset_total`.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn reset_total(&mut self) {
        self.total = 0;
    }

    /// `(finished, total)` for progress display.
    pub fn progress(&self) -> (usize, usize) {
        let pending = self.queue.len()
            + match self.remaining() {
                IDLE => 0,
                remaining => remaining,
            };
        (self.total.saturating_sub(pending), self.total)
    }

    /// Queues an effect unless it is already waiting. Returns whether it was
    /// added.
    pub fn enqueue(&mut self, index: usize) -> bool {
        if self.queue.contains(&index) {
            return false;
        }
        self.queue.push(index);
        self.total += 1;
        true
    }

    /// Removes and returns the queued effect indices in insertion order.
    pub fn take_queue(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.queue)
    }

    /// Starts a batch: every `(index, job)` pair is handed to `work` on one of
    /// up to `worker_count` threads.
    pub fn dispatch<J, F>(
        &mut self,
        jobs: Vec<(usize, J)>,
        work: F,
        worker_count: usize,
    ) -> Result<usize, SchedulerError>
    where
        J: Send + 'static,
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        if self.is_loading() {
            return Err(SchedulerError::Busy {
                remaining: self.remaining(),
            });
        }
        if jobs.is_empty() {
            return Ok(0);
        }

        let count = jobs.len();
        let (job_tx, job_rx) = unbounded::<(usize, J)>();
        let (result_tx, result_rx) = unbounded::<Completion<R>>();
        for job in jobs {
            // Receiver is alive in this scope, so sending cannot fail.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        self.remaining.store(count, Ordering::Release);
        self.dispatched = count;
        self.completed = 0;

        let work = Arc::new(work);
        let threads = worker_count.clamp(1, count);
        let mut spawn_error = None;
        for id in 0..threads {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let remaining = Arc::clone(&self.remaining);
            let work = Arc::clone(&work);
            let spawned = thread::Builder::new()
                .name(format!("fx-compile-{id}"))
                .spawn(move || run_worker(job_rx, result_tx, remaining, work));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(err) => {
                    warn!(worker = id, %err, "failed to spawn compile worker");
                    spawn_error = Some(err);
                    break;
                }
            }
        }

        if self.workers.is_empty() {
            self.remaining.store(IDLE, Ordering::Release);
            self.dispatched = 0;
            return Err(SchedulerError::Spawn(spawn_error.unwrap_or_else(|| {
                std::io::Error::other("no compile worker could be started")
            })));
        }

        debug!(jobs = count, workers = self.workers.len(), "dispatched compile batch");
        self.results = Some(result_rx);
        Ok(count)
    }

    /// Collects finished jobs without blocking.
    pub fn poll(&mut self) -> Drained<R> {
        let Some(results) = self.results.as_ref() else {
            return Drained::default();
        };
        let completions: Vec<_> = results.try_iter().collect();
        self.completed += completions.len();
        let finished = self.completed >= self.dispatched;
        if finished {
            self.finish();
        }
        Drained {
            completions,
            finished,
        }
    }

    /// Blocks until every job of the current batch has completed.
    pub fn wait(&mut self) -> Drained<R> {
        let Some(results) = self.results.as_ref() else {
            return Drained::default();
        };
        let mut completions = Vec::new();
        while self.completed < self.dispatched {
            match results.recv() {
                Ok(completion) => {
                    self.completed += 1;
                    completions.push(completion);
                }
                Err(_) => {
                    error!(
                        completed = self.completed,
                        dispatched = self.dispatched,
                        "compile workers exited before reporting every job"
                    );
                    break;
                }
            }
        }
        self.finish();
        Drained {
            completions,
            finished: true,
        }
    }

    fn finish(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("compile worker exited abnormally");
            }
        }
        self.results = None;
        self.dispatched = 0;
        self.completed = 0;
        self.remaining.store(IDLE, Ordering::Release);
    }
}

impl<R> Drop for ReloadScheduler<R> {
    fn drop(&mut self) {
        self.results = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_worker<J, R, F>(
    jobs: Receiver<(usize, J)>,
    results: Sender<Completion<R>>,
    remaining: Arc<AtomicUsize>,
    work: Arc<F>,
) where
    F: Fn(J) -> R,
{
    while let Ok((index, job)) = jobs.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(job)))
            .map_err(|_| SchedulerError::WorkerPanicked(index));
        if let Err(err) = &outcome {
            error!(effect = index, %err, "compile job aborted");
        }
        // The receiver may already be gone when the scheduler was dropped.
        let _ = results.send(Completion { index, outcome });
        remaining.fetch_sub(1, Ordering::AcqRel);
    }
}
