use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use super::{WorkerContext, run_worker};
use crate::config::DelayRange;

/// Running set of workers sharing one context
pub struct FetcherPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    ctx: Arc<WorkerContext>,
}

impl FetcherPool {
    /// Spawn `workers` workers, pausing a random `stagger` between each spawn
    pub async fn spawn(ctx: Arc<WorkerContext>, workers: usize, stagger: DelayRange) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let span = info_span!("worker", worker_id);
            let handle = tokio::spawn(
                run_worker(worker_id, ctx.clone(), cancel.child_token()).instrument(span),
            );
            handles.push(handle);

            if worker_id + 1 < workers {
                tokio::time::sleep(stagger.sample()).await;
            }
        }

        info!(workers, "Fetcher pool started");
        Self {
            handles,
            cancel,
            ctx,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop all workers, waiting up to `grace` for in-flight items
    ///
    /// Returns the number of workers that had to be aborted.
    pub async fn shutdown(self, grace: Duration) -> usize {
        self.ctx.queue.close();
        self.cancel.cancel();

        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(grace, join_all(self.handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        if e.is_panic() {
                            warn!(error = %e, "Worker panicked");
                        }
                    }
                }
                0
            }
            Err(_) => {
                let mut aborted = 0;
                for abort in aborts {
                    if !abort.is_finished() {
                        abort.abort();
                        aborted += 1;
                    }
                }
                warn!(aborted, ?grace, "Workers did not stop in time, aborted");
                aborted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SharedLedger;
    use crate::observability::Metrics;
    use crate::progress::NoProgress;
    use crate::queue::{QueueItem, WorkQueue};
    use crate::storage::FileStore;
    use crate::worker::http::{self, Fetch, FetchResponse};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct SlowFetcher(Duration);

    #[async_trait]
    impl Fetch for SlowFetcher {
        async fn get(&self, _url: &str) -> http::Result<FetchResponse> {
            tokio::time::sleep(self.0).await;
            Ok(FetchResponse::from_bytes(200, &b"png"[..]))
        }
    }

    fn context(temp: &TempDir, n: u64, delay: Duration) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            ledger: Arc::new(SharedLedger::open(temp.path().join("l.csv"), "0xabc", n).unwrap()),
            queue: Arc::new(WorkQueue::new()),
            fetcher: Arc::new(SlowFetcher(delay)),
            store: FileStore::new(temp.path().join("out")),
            metrics: Arc::new(Metrics::new()),
            progress: Arc::new(NoProgress),
            checkpoint_interval: 100,
            jitter: DelayRange::ZERO,
        })
    }

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, 20, Duration::ZERO);
        for id in 0..20 {
            ctx.queue.push(QueueItem::new(id, format!("http://x/{}", id)));
        }

        let pool = FetcherPool::spawn(ctx.clone(), 4, DelayRange::ZERO).await;
        assert_eq!(pool.len(), 4);
        ctx.queue.join().await;

        assert_eq!(pool.shutdown(Duration::from_secs(1)).await, 0);
        assert_eq!(ctx.ledger.count_succeeded().await, 20);
        assert_eq!(ctx.metrics.snapshot().processed(), 20);
    }

    #[tokio::test]
    async fn test_idle_workers_stop_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, 1, Duration::ZERO);

        let pool = FetcherPool::spawn(ctx, 3, DelayRange::ZERO).await;
        assert_eq!(pool.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn test_stuck_worker_is_aborted_without_marking_success() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, 1, Duration::from_secs(30));
        ctx.queue.push(QueueItem::new(0, "http://x/0"));

        let pool = FetcherPool::spawn(ctx.clone(), 1, DelayRange::ZERO).await;
        // let the worker pick the item up
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pool.shutdown(Duration::from_millis(50)).await, 1);
        assert!(!ctx.ledger.is_succeeded(0).await);
        assert!(!ctx.store.path_for(0).exists());
    }
}
