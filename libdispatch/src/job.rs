use crate::barrier::CompletionBarrier;
use crate::progress::ProgressSink;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upload parameters shared by every job of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Destination bucket
    pub bucket: String,
    /// Multipart chunk size in MiB
    pub part_size_mib: u64,
    /// Number of parts uploaded in parallel for one file
    pub concurrency: usize,
}

impl UploadTarget {
    pub fn new(bucket: impl Into<String>, part_size_mib: u64, concurrency: usize) -> Self {
        Self {
            bucket: bucket.into(),
            part_size_mib,
            concurrency,
        }
    }

    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_mib.max(1).saturating_mul(1024 * 1024)
    }
}

/// One file to transfer.
///
/// A job is built by the producer, handed to exactly one worker and consumed
/// by [`Job::complete`]. It cannot be cloned or changed after construction.
pub struct Job {
    seq: u64,
    source: PathBuf,
    key: String,
    target: Arc<UploadTarget>,
    barrier: CompletionBarrier,
    progress: Arc<dyn ProgressSink>,
}

impl Job {
    pub fn new(
        seq: u64,
        source: impl Into<PathBuf>,
        key: impl Into<String>,
        target: Arc<UploadTarget>,
        barrier: CompletionBarrier,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            seq,
            source: source.into(),
            key: key.into(),
            target,
            barrier,
            progress,
        }
    }

    /// Position of the job in submission order.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bucket(&self) -> &str {
        &self.target.bucket
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Record that the job has been attempted: release the barrier, then
    /// bump the progress signal.
    pub fn complete(self) {
        self.barrier.done();
        self.progress.increment();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("seq", &self.seq)
            .field("source", &self.source)
            .field("key", &self.key)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
