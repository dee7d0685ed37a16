//! Routes queued jobs to idle workers.
//!
//! Workers publish a [`WorkerHandle`] into the availability pool whenever they
//! become idle. The routing task pulls jobs off the [`JobQueue`] and, for each
//! one, spawns a hand-off that waits for the next published handle. Hand-offs
//! race for handles, so delivery is first-ready-first-served rather than
//! strict FIFO across jobs.

use crate::error::DispatchError;
use crate::job::Job;
use crate::queue::{JobQueue, QueuedJob};
use crate::transfer::Transfer;
use crate::worker::{Worker, WorkerControl, WorkerHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

pub const DEFAULT_POOL_SIZE: usize = 32;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of workers, i.e. the maximum number of concurrent uploads
    pub pool_size: usize,
    /// Jobs accepted ahead of the workers before `submit` starts to wait
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    pub fn new(pool_size: usize, queue_capacity: usize) -> Self {
        Self {
            pool_size,
            queue_capacity,
        }
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.pool_size == 0 {
            return Err(DispatchError::InvalidConfig(
                "pool size must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(DispatchError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A fixed pool of workers plus the task that feeds them.
///
/// Must be started from within a Tokio runtime. Dropping the dispatcher
/// aborts routing and asks every worker to stop; use [`shutdown`](Self::shutdown)
/// to let queued jobs drain first. Jobs that never reached a worker are
/// settled as attempted (and logged) when routing is torn down, so a pending
/// [`Collector::finish`](crate::Collector::finish) still returns.
pub struct Dispatcher {
    config: DispatcherConfig,
    queue: Option<JobQueue>,
    workers: Vec<WorkerControl>,
    router: Option<JoinHandle<()>>,
    // Keeps the pool open while the dispatcher lives, even if every worker stopped.
    _pool: async_channel::Sender<WorkerHandle>,
}

impl Dispatcher {
    pub fn start<T: Transfer>(
        config: DispatcherConfig,
        transfer: Arc<T>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;

        let (pool_tx, pool_rx) = async_channel::bounded(config.pool_size);
        let workers = (0..config.pool_size)
            .map(|id| Worker::new(id + 1, pool_tx.clone(), transfer.clone()).start())
            .collect();

        let (queue, jobs) = JobQueue::bounded(config.queue_capacity);
        let router = tokio::spawn(route(jobs, pool_rx));

        tracing::info!(
            pool_size = config.pool_size,
            queue_capacity = config.queue_capacity,
            "dispatcher started"
        );

        Ok(Self {
            config,
            queue: Some(queue),
            workers,
            router: Some(router),
            _pool: pool_tx,
        })
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Submission handle for producers.
    pub fn queue(&self) -> JobQueue {
        self.queue
            .clone()
            .expect("queue is only taken by shutdown, which consumes the dispatcher")
    }

    pub async fn submit(&self, job: Job) -> Result<(), DispatchError> {
        match &self.queue {
            Some(queue) => queue.submit(job).await,
            None => Err(DispatchError::QueueClosed),
        }
    }

    pub fn workers(&self) -> &[WorkerControl] {
        &self.workers
    }

    /// Ask worker `id` to stop; returns false if there is no such worker.
    pub fn stop_worker(&self, id: usize) -> bool {
        match self.workers.iter().find(|w| w.id() == id) {
            Some(worker) => {
                worker.stop();
                true
            }
            None => false,
        }
    }

    /// Close the queue, wait for every queued job to reach a worker, then stop
    /// and join all workers.
    ///
    /// Routing only ends once every [`JobQueue`] clone handed out by
    /// [`queue`](Self::queue) has been dropped.
    pub async fn shutdown(mut self) {
        drop(self.queue.take());
        if let Some(router) = self.router.take() {
            if let Err(err) = router.await {
                tracing::error!("dispatcher routing task failed: {err}");
            }
        }
        let workers = std::mem::take(&mut self.workers);
        for worker in &workers {
            worker.stop();
        }
        for worker in workers {
            let id = worker.id();
            if let Err(err) = worker.join().await {
                tracing::error!(worker = id, "worker task failed: {err}");
            }
        }
        tracing::info!("dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(router) = self.router.take() {
            router.abort();
        }
        for worker in &self.workers {
            worker.stop();
        }
    }
}

async fn route(
    mut jobs: mpsc::Receiver<QueuedJob>,
    pool: async_channel::Receiver<WorkerHandle>,
) {
    let mut handoffs = JoinSet::new();
    loop {
        tokio::select! {
            queued = jobs.recv() => match queued {
                Some(queued) => {
                    handoffs.spawn(hand_off(queued, pool.clone()));
                }
                None => break,
            },
            Some(res) = handoffs.join_next(), if !handoffs.is_empty() => {
                if let Err(err) = res {
                    tracing::error!("job hand-off failed: {err}");
                }
            }
        }
    }

    while let Some(res) = handoffs.join_next().await {
        if let Err(err) = res {
            tracing::error!("job hand-off failed: {err}");
        }
    }
    tracing::debug!("job queue closed, routing finished");
}

async fn hand_off(mut queued: QueuedJob, pool: async_channel::Receiver<WorkerHandle>) {
    loop {
        // The job stays inside `queued` while waiting, so an aborted hand-off
        // still settles it on drop.
        let Ok(handle) = pool.recv().await else {
            if let Some(job) = queued.job() {
                tracing::error!(seq = job.seq(), key = job.key(), "no worker left to run job");
            }
            return;
        };
        let Some(job) = queued.take() else {
            return;
        };
        let worker_id = handle.worker_id();
        match handle.assign(job) {
            Ok(()) => {
                tracing::debug!(worker = worker_id, "dispatched job");
                return;
            }
            Err(returned) => {
                tracing::warn!(worker = worker_id, "worker stopped before taking job");
                queued.restore(returned);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(DispatcherConfig::default().validate().is_ok());
        assert!(DispatcherConfig::new(1, 1).validate().is_ok());
        assert!(matches!(
            DispatcherConfig::new(0, 10).validate(),
            Err(DispatchError::InvalidConfig(_))
        ));
        assert!(matches!(
            DispatcherConfig::new(4, 0).validate(),
            Err(DispatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_sizes() {
        let config = DispatcherConfig::default();
        assert_eq!(config.pool_size, 32);
        assert_eq!(config.queue_capacity, 100);
    }
}
