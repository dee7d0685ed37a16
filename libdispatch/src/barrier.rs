//! Counter of outstanding jobs that a producer can wait on.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared counter of jobs armed but not yet attempted.
///
/// The producer calls [`add`](Self::add) before each submission, the worker
/// calls [`done`](Self::done) after the transfer attempt, whatever its outcome.
/// [`wait`](Self::wait) resolves once the count is back to zero.
#[derive(Clone, Debug)]
pub struct CompletionBarrier {
    count: Arc<watch::Sender<usize>>,
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0usize);
        Self {
            count: Arc::new(tx),
        }
    }

    pub fn add(&self, n: usize) {
        self.count.send_modify(|count| *count += n);
    }

    pub fn done(&self) {
        self.count.send_modify(|count| {
            debug_assert!(*count > 0, "completion barrier released more than armed");
            *count = count.saturating_sub(1);
        });
    }

    pub fn outstanding(&self) -> usize {
        *self.count.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_unarmed() {
        let barrier = CompletionBarrier::new();
        timeout(Duration::from_millis(100), barrier.wait())
            .await
            .expect("unarmed barrier should not block");
    }

    #[tokio::test]
    async fn test_wait_until_all_done() {
        let barrier = CompletionBarrier::new();
        barrier.add(3);
        assert_eq!(barrier.outstanding(), 3);

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        barrier.done();
        barrier.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        barrier.done();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake up")
            .unwrap();
        assert_eq!(barrier.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_rearm_after_release() {
        let barrier = CompletionBarrier::new();
        barrier.add(1);
        barrier.done();
        barrier.wait().await;

        barrier.add(2);
        let pending = timeout(Duration::from_millis(20), barrier.wait()).await;
        assert!(pending.is_err());
    }
}
