//! Bounded concurrent job dispatcher for directory-to-object-storage sync.
//!
//! A producer ([`Collector`]) pushes one [`Job`] per file into a bounded
//! [`JobQueue`]. The [`Dispatcher`] pairs queued jobs with idle workers, each
//! worker runs one [`Transfer`] at a time, and a shared [`CompletionBarrier`]
//! tells the producer when every job has been attempted.

pub mod barrier;
pub mod collector;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod progress;
pub mod queue;
pub mod transfer;
pub mod worker;

pub use barrier::CompletionBarrier;
pub use collector::Collector;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, TransferError};
pub use job::{Job, UploadTarget};
pub use progress::{NoProgress, ProgressCounter, ProgressSink};
pub use queue::JobQueue;
pub use transfer::{Transfer, Uploaded, humanize_duration};
pub use worker::{WorkerControl, current_worker_id};
