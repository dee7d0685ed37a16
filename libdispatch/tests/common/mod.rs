#![allow(dead_code)]

use async_trait::async_trait;
use libdispatch::{Job, Transfer, TransferError, Uploaded, current_worker_id};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Closed gates let no transfer through until `open` is called.
const OPEN: usize = Semaphore::MAX_PERMITS / 2;

#[derive(Debug, Clone)]
pub struct Execution {
    pub worker: usize,
    pub key: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Transfer double recording every invocation.
pub struct InstrumentedTransfer {
    delay: Duration,
    fail_keys: HashSet<String>,
    gate: Semaphore,
    invocations: AtomicUsize,
    successes: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    executions: Mutex<Vec<Execution>>,
}

impl InstrumentedTransfer {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_keys: HashSet::new(),
            gate: Semaphore::new(OPEN),
            invocations: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            executions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, key: impl Into<String>) -> Self {
        self.fail_keys.insert(key.into());
        self
    }

    /// Transfers block until [`open`](Self::open) is called.
    pub fn gated(mut self) -> Self {
        self.gate = Semaphore::new(0);
        self
    }

    pub fn open(&self) {
        self.gate.add_permits(OPEN);
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.executions.lock().unwrap().clone()
    }

    pub fn executions_by_worker(&self) -> HashMap<usize, Vec<Execution>> {
        let mut by_worker: HashMap<usize, Vec<Execution>> = HashMap::new();
        for execution in self.executions() {
            by_worker
                .entry(execution.worker)
                .or_default()
                .push(execution);
        }
        by_worker
    }
}

#[async_trait]
impl Transfer for InstrumentedTransfer {
    async fn transfer(&self, job: &Job) -> Result<Uploaded, TransferError> {
        let worker = current_worker_id().expect("transfer runs inside a worker");
        let started = Instant::now();
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        self.gate
            .acquire()
            .await
            .expect("gate is never closed")
            .forget();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.executions.lock().unwrap().push(Execution {
            worker,
            key: job.key().to_string(),
            started,
            finished: Instant::now(),
        });

        if self.fail_keys.contains(job.key()) {
            return Err(TransferError::Transport {
                operation: "upload_part",
                message: format!("connection reset while sending {}", job.key()),
            });
        }
        self.successes.fetch_add(1, Ordering::SeqCst);
        Ok(Uploaded {
            location: format!("s3://{}/{}", job.bucket(), job.key()),
            size: 0,
            elapsed: started.elapsed(),
        })
    }
}

pub fn key(n: usize) -> String {
    format!("file-{n}")
}
