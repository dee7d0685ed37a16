use crate::barrier::CompletionBarrier;
use crate::error::DispatchError;
use crate::job::{Job, UploadTarget};
use crate::progress::{ProgressSink, SettledProgress};
use crate::queue::JobQueue;
use std::path::PathBuf;
use std::sync::Arc;

/// Producer side of a sync run: turns discovered files into jobs and waits
/// until every one of them has been attempted.
///
/// The collector learns nothing about individual outcomes. Once
/// [`finish`](Self::finish) returns, every job was tried, not necessarily
/// uploaded.
pub struct Collector {
    queue: JobQueue,
    target: Arc<UploadTarget>,
    progress: Arc<SettledProgress>,
    barrier: CompletionBarrier,
    submitted: u64,
}

impl Collector {
    pub fn new(queue: JobQueue, target: UploadTarget, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            queue,
            target: Arc::new(target),
            progress: Arc::new(SettledProgress::new(progress)),
            barrier: CompletionBarrier::new(),
            submitted: 0,
        }
    }

    /// Queue one file, waiting while the queue is full.
    pub async fn collect(
        &mut self,
        source: impl Into<PathBuf>,
        key: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.barrier.add(1);
        let job = Job::new(
            self.submitted,
            source,
            key,
            self.target.clone(),
            self.barrier.clone(),
            self.progress.clone(),
        );
        if let Err(err) = self.queue.submit(job).await {
            self.barrier.done();
            return Err(err);
        }
        self.submitted += 1;
        Ok(())
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    /// Wait for every collected job to be attempted, then close the progress
    /// signal. Returns the number of jobs collected.
    ///
    /// Workers bump progress after releasing the barrier, so the progress
    /// signal is only closed once all of those increments have landed too.
    pub async fn finish(self) -> u64 {
        self.barrier.wait().await;
        self.progress.wait_for(self.submitted).await;
        self.progress.finish();
        tracing::info!(jobs = self.submitted, "all jobs attempted");
        self.submitted
    }
}
