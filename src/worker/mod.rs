//! Fetcher pool
//!
//! N workers pull items from the shared work queue, download them into the
//! file store and record the outcome in the shared ledger.

pub mod http;
pub mod pool;
pub mod runner;

pub use http::{DownloadError, Fetch, FetchResponse, HttpClient};
pub use pool::FetcherPool;
pub use runner::{ItemError, Outcome};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DelayRange;
use crate::ledger::SharedLedger;
use crate::observability::Metrics;
use crate::progress::Progress;
use crate::queue::WorkQueue;
use crate::storage::FileStore;

/// Everything a worker shares with the rest of the pool
pub struct WorkerContext {
    pub ledger: Arc<SharedLedger>,
    pub queue: Arc<WorkQueue>,
    pub fetcher: Arc<dyn Fetch>,
    pub store: FileStore,
    pub metrics: Arc<Metrics>,
    pub progress: Arc<dyn Progress>,
    pub checkpoint_interval: u64,
    pub jitter: DelayRange,
}

/// Worker loop: runs until cancelled or the queue is closed
///
/// Cancellation is only observed while waiting for the next item, so an item
/// that has been popped is always carried through to `task_done`.
pub async fn run_worker(worker_id: usize, ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    debug!(worker_id, "Worker started");

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = ctx.queue.pop() => match item {
                Some(item) => item,
                None => break,
            },
        };

        ctx.progress.tick();
        runner::process_item(&ctx, &item).await;

        if runner::is_checkpoint(item.id, ctx.checkpoint_interval) {
            runner::checkpoint(&ctx, item.id).await;
        }

        tokio::time::sleep(ctx.jitter.sample()).await;
        ctx.queue.task_done();
    }

    debug!(worker_id, "Worker stopped");
}
