use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Sink for "one job finished" notifications.
///
/// Workers call `increment` exactly once per job, after releasing the
/// completion barrier. `finish` is called by the collector once every job
/// has been attempted.
pub trait ProgressSink: Send + Sync {
    fn increment(&self);

    fn finish(&self) {}
}

/// Headless progress signal: a monotonically increasing completion counter.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    completed: AtomicU64,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

impl ProgressSink for ProgressCounter {
    fn increment(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Progress sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn increment(&self) {}
}

/// Forwards to another sink and counts the increments that went through, so
/// the producer can hold `finish` back until the last one has landed.
pub(crate) struct SettledProgress {
    inner: Arc<dyn ProgressSink>,
    settled: watch::Sender<u64>,
}

impl SettledProgress {
    pub(crate) fn new(inner: Arc<dyn ProgressSink>) -> Self {
        let (settled, _rx) = watch::channel(0);
        Self { inner, settled }
    }

    /// Resolves once at least `count` increments have reached the inner sink.
    pub(crate) async fn wait_for(&self, count: u64) {
        let mut rx = self.settled.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|settled| *settled >= count).await;
    }
}

impl ProgressSink for SettledProgress {
    fn increment(&self) {
        self.inner.increment();
        self.settled.send_modify(|settled| *settled += 1);
    }

    fn finish(&self) {
        self.inner.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_settled_counts_after_inner() {
        let counter = Arc::new(ProgressCounter::new());
        let settled = Arc::new(SettledProgress::new(counter.clone()));

        let waiter = {
            let settled = settled.clone();
            tokio::spawn(async move { settled.wait_for(2).await })
        };
        settled.increment();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        settled.increment();
        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(counter.completed(), 2);
    }
}
