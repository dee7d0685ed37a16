//! Upload workers and the handles they publish when idle.

use crate::job::Job;
use crate::transfer::Transfer;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static WORKER_ID: usize;
}

/// Id of the worker whose task is currently running, `None` outside workers.
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.try_with(|id| *id).ok()
}

/// Inbound slot of an idle worker. It accepts exactly one job.
///
/// A worker publishes a fresh handle every time it becomes idle, so a handle
/// taken out of the availability pool always belongs to a worker that holds
/// no job.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    worker_id: usize,
    slot: oneshot::Sender<Job>,
}

impl WorkerHandle {
    pub(crate) fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Hand the job over. Gives it back if the worker stopped in the meantime.
    pub(crate) fn assign(self, job: Job) -> Result<(), Job> {
        self.slot.send(job)
    }
}

pub(crate) struct Worker<T> {
    id: usize,
    pool: async_channel::Sender<WorkerHandle>,
    quit: CancellationToken,
    transfer: Arc<T>,
}

impl<T: Transfer> Worker<T> {
    pub(crate) fn new(
        id: usize,
        pool: async_channel::Sender<WorkerHandle>,
        transfer: Arc<T>,
    ) -> Self {
        Self {
            id,
            pool,
            quit: CancellationToken::new(),
            transfer,
        }
    }

    pub(crate) fn start(self) -> WorkerControl {
        let id = self.id;
        let quit = self.quit.clone();
        let task = tokio::spawn(WORKER_ID.scope(id, self.run()));
        WorkerControl { id, quit, task }
    }

    async fn run(self) {
        tracing::debug!(worker = self.id, "worker started");
        loop {
            if self.quit.is_cancelled() {
                break;
            }

            let (tx, mut slot) = oneshot::channel();
            let handle = WorkerHandle {
                worker_id: self.id,
                slot: tx,
            };
            if self.pool.send(handle).await.is_err() {
                tracing::debug!(worker = self.id, "availability pool closed");
                break;
            }

            let job = tokio::select! {
                biased;
                assigned = &mut slot => match assigned {
                    Ok(job) => job,
                    // The handle was discarded without a job; publish a new one.
                    Err(_) => continue,
                },
                _ = self.quit.cancelled() => {
                    // Closing first makes a concurrent `assign` hand the job back
                    // to the dispatcher; a job that got in before that still runs.
                    slot.close();
                    match slot.try_recv() {
                        Ok(job) => job,
                        Err(_) => break,
                    }
                }
            };

            self.execute(job).await;
        }
        tracing::debug!(worker = self.id, "worker stopping");
    }

    async fn execute(&self, job: Job) {
        tracing::debug!(
            worker = self.id,
            seq = job.seq(),
            source = %job.source().display(),
            key = job.key(),
            "processing file"
        );
        match self.transfer.transfer(&job).await {
            Ok(uploaded) => {
                tracing::debug!(
                    worker = self.id,
                    seq = job.seq(),
                    size = uploaded.size,
                    elapsed = ?uploaded.elapsed,
                    "uploaded to {}",
                    uploaded.location
                );
            }
            Err(err) => {
                tracing::error!(
                    worker = self.id,
                    seq = job.seq(),
                    local = err.is_local(),
                    cancelled = err.is_cancelled(),
                    "upload of {} to {}/{} failed: {err}",
                    job.source().display(),
                    job.bucket(),
                    job.key()
                );
            }
        }
        job.complete();
    }
}

/// Caller side of a running worker.
#[derive(Debug)]
pub struct WorkerControl {
    id: usize,
    quit: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerControl {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Ask the worker to stop. Advisory: a job already being executed runs to
    /// the end, and the call returns without waiting for the worker.
    pub fn stop(&self) {
        self.quit.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}
