//! Bounded FIFO of jobs between the producer and the dispatcher.

use crate::error::DispatchError;
use crate::job::Job;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};

/// A job waiting for a worker, together with the queue slot it occupies.
///
/// The slot is only given back once the job reaches a worker, so jobs held
/// by the dispatcher between dequeue and hand-off still count against the
/// queue capacity. A job still inside when this is dropped (dispatcher torn
/// down, no worker left) is completed as attempted so the producer's wait
/// does not hang.
pub(crate) struct QueuedJob {
    job: Option<Job>,
    _slot: OwnedSemaphorePermit,
}

impl QueuedJob {
    pub(crate) fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub(crate) fn take(&mut self) -> Option<Job> {
        self.job.take()
    }

    pub(crate) fn restore(&mut self, job: Job) {
        self.job = Some(job);
    }
}

impl Drop for QueuedJob {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            tracing::warn!(
                seq = job.seq(),
                key = job.key(),
                "job dropped before reaching a worker"
            );
            job.complete();
        }
    }
}

/// Submission side of the job queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl JobQueue {
    pub(crate) fn bounded(capacity: usize) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            tx,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        };
        (queue, rx)
    }

    /// Push a job, suspending while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), DispatchError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::QueueClosed)?;
        tracing::trace!(seq = job.seq(), key = job.key(), "job queued");
        let queued = QueuedJob {
            job: Some(job),
            _slot: slot,
        };
        match self.tx.send(queued).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(mut rejected)) => {
                // Never accepted, so the caller still owns its barrier arm.
                rejected.take();
                Err(DispatchError::QueueClosed)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::CompletionBarrier;
    use crate::job::UploadTarget;
    use crate::progress::NoProgress;
    use std::time::Duration;

    fn job(seq: u64, barrier: &CompletionBarrier) -> Job {
        barrier.add(1);
        Job::new(
            seq,
            format!("/src/{seq}"),
            format!("dst/{seq}"),
            Arc::new(UploadTarget::new("bucket", 8, 1)),
            barrier.clone(),
            Arc::new(NoProgress),
        )
    }

    fn seq(queued: &QueuedJob) -> u64 {
        queued.job().map(Job::seq).unwrap()
    }

    #[tokio::test]
    async fn test_submit_blocks_until_slot_released() {
        let barrier = CompletionBarrier::new();
        let (queue, mut rx) = JobQueue::bounded(2);
        assert_eq!(queue.capacity(), 2);
        queue.submit(job(0, &barrier)).await.unwrap();
        queue.submit(job(1, &barrier)).await.unwrap();
        assert_eq!(queue.available_slots(), 0);

        // Dequeuing alone does not free a slot.
        let mut first = rx.recv().await.unwrap();
        assert_eq!(seq(&first), 0);
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), queue.submit(job(2, &barrier))).await;
        assert!(blocked.is_err());

        let delivered = first.take().unwrap();
        drop(first);
        assert_eq!(queue.available_slots(), 1);
        delivered.complete();
        tokio::time::timeout(Duration::from_secs(1), queue.submit(job(3, &barrier)))
            .await
            .expect("slot should be free")
            .unwrap();
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let barrier = CompletionBarrier::new();
        let (queue, mut rx) = JobQueue::bounded(4);
        for n in 0..4 {
            queue.submit(job(n, &barrier)).await.unwrap();
        }
        for n in 0..4 {
            assert_eq!(seq(&rx.recv().await.unwrap()), n);
        }
    }

    #[tokio::test]
    async fn test_dropped_job_is_settled() {
        let barrier = CompletionBarrier::new();
        let (queue, rx) = JobQueue::bounded(2);
        queue.submit(job(0, &barrier)).await.unwrap();
        queue.submit(job(1, &barrier)).await.unwrap();
        assert_eq!(barrier.outstanding(), 2);

        drop(rx);
        assert_eq!(barrier.outstanding(), 0);
        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("dropped jobs must release the barrier");
    }

    #[tokio::test]
    async fn test_submit_after_receiver_dropped() {
        let barrier = CompletionBarrier::new();
        let (queue, rx) = JobQueue::bounded(1);
        drop(rx);
        assert!(queue.is_closed());
        assert!(matches!(
            queue.submit(job(0, &barrier)).await,
            Err(DispatchError::QueueClosed)
        ));
        // A rejected job is left to the caller to roll back.
        assert_eq!(barrier.outstanding(), 1);
    }
}
