//! Bounded worker pool with incremental results.
//!
//! A fixed number of workers drain one shared queue. Each worker pops the next
//! item under a mutex, runs the job for it, and pushes successes onto a
//! channel the caller reads from as they arrive. A failed item is logged and
//! skipped; it never stops the pool.
//!
//! Results come out in completion order, not submission order.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Workers used when nothing else is configured.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Per-run tallies, available once every worker has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub succeeded: usize,
    /// Labels of the items whose job failed.
    pub failed: Vec<String>,
}

impl PoolSummary {
    fn merge(&mut self, other: PoolSummary) {
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl WorkerPool {
    /// A pool of `concurrency` workers (at least one).
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency: concurrency.max(1) }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start draining `items` through `job` and hand back the live result sequence.
    ///
    /// Must be called from within a tokio runtime. Exactly `concurrency`
    /// workers are spawned; those that find the queue empty exit immediately.
    pub fn run<I, T, E, F, Fut>(&self, items: Vec<I>, job: F) -> FilterJob<T>
    where
        I: Display + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let total = items.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let job = Arc::new(job);
        let (tx, rx) = mpsc::unbounded_channel();
        let concurrency = self.concurrency;

        let supervisor = tokio::spawn(async move {
            let mut workers = JoinSet::new();
            for id in 0..concurrency {
                workers.spawn(worker(id, Arc::clone(&queue), Arc::clone(&job), tx.clone()));
            }
            drop(tx);

            let mut summary = PoolSummary::default();
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(partial) => summary.merge(partial),
                    Err(e) => tracing::error!(error = %e, "pool worker died"),
                }
            }
            tracing::debug!(total, succeeded = summary.succeeded, failed = summary.failed.len(), "pool drained");
            summary
        });

        FilterJob { rx, supervisor: Some(supervisor), total }
    }
}

async fn worker<I, T, E, F, Fut>(
    id: usize, queue: Arc<Mutex<VecDeque<I>>>, job: Arc<F>, tx: mpsc::UnboundedSender<T>,
) -> PoolSummary
where
    I: Display,
    E: Display,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut summary = PoolSummary::default();
    loop {
        let next = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).pop_front();
        let Some(item) = next else { break };

        let label = item.to_string();
        match job(item).await {
            Ok(result) => {
                summary.succeeded += 1;
                if tx.send(result).is_err() {
                    tracing::debug!(worker = id, "result receiver gone");
                }
            }
            Err(e) => {
                tracing::warn!(worker = id, item = %label, error = %e, "item failed, skipping");
                summary.failed.push(label);
            }
        }
    }
    summary
}

/// Handle on one pool run.
///
/// Read results with [`next`](Self::next) as they complete, or wait for all of
/// them with [`finish`](Self::finish). Dropping the handle aborts the workers.
pub struct FilterJob<T> {
    rx: mpsc::UnboundedReceiver<T>,
    supervisor: Option<JoinHandle<PoolSummary>>,
    total: usize,
}

impl<T> FilterJob<T> {
    /// Next completed result; `None` once every worker has finished.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Number of items submitted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Wait for the pool to drain. Returns the results not yet taken with
    /// `next` and the run summary.
    pub async fn finish(mut self) -> (Vec<T>, PoolSummary) {
        let mut rest = Vec::new();
        while let Some(result) = self.rx.recv().await {
            rest.push(result);
        }

        let summary = match self.supervisor.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                tracing::error!(error = %e, "pool supervisor failed");
                PoolSummary::default()
            }),
            None => PoolSummary::default(),
        };
        (rest, summary)
    }
}

impl<T> Drop for FilterJob<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
    }
}
