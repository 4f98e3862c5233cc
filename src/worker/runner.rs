//! Task runner - processes individual queue items

use thiserror::Error;
use tracing::{debug, error, warn};

use super::WorkerContext;
use super::http::DownloadError;
use crate::queue::QueueItem;
use crate::storage::StorageError;

/// Why a single item failed; never escapes the worker
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Download failed: {0}")]
    Fetch(#[from] DownloadError),

    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("Write failed: {0}")]
    Write(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, ItemError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { bytes: u64 },
    Failed,
    /// Already succeeded in the ledger when popped
    Skipped,
}

/// Fetch one item, store it and record the result in the ledger
pub async fn process_item(ctx: &WorkerContext, item: &QueueItem) -> Outcome {
    let id = item.id;

    if ctx.ledger.is_succeeded(id).await {
        debug!(id, "Already downloaded, skipping");
        ctx.metrics.item_skipped();
        return Outcome::Skipped;
    }

    if let Err(e) = ctx.ledger.record_url(id, &item.url).await {
        error!(id, error = %e, "Failed to record URL");
    }

    let outcome = match download(ctx, item).await {
        Ok(bytes) => {
            debug!(id, bytes, "Download completed");
            ctx.metrics.item_succeeded(bytes);
            Outcome::Succeeded { bytes }
        }
        Err(e) => {
            warn!(id, url = %item.url, error = %e, "Download failed");
            ctx.metrics.item_failed();
            Outcome::Failed
        }
    };

    // The file is already renamed into place when success is recorded
    let ok = matches!(outcome, Outcome::Succeeded { .. });
    if let Err(e) = ctx.ledger.record_status(id, ok).await {
        error!(id, error = %e, "Failed to record status");
    }

    outcome
}

async fn download(ctx: &WorkerContext, item: &QueueItem) -> Result<u64> {
    let response = ctx.fetcher.get(&item.url).await?;
    if response.status != 200 {
        return Err(ItemError::UnexpectedStatus(response.status));
    }
    Ok(ctx.store.save(item.id, response.body).await?)
}

pub fn is_checkpoint(id: u64, interval: u64) -> bool {
    interval > 0 && id % interval == 0
}

/// Persist the ledger; a failed checkpoint is logged and the run goes on
pub async fn checkpoint(ctx: &WorkerContext, id: u64) {
    match ctx.ledger.persist().await {
        Ok(()) => {
            ctx.metrics.checkpoint();
            debug!(id, "Ledger checkpoint written");
        }
        Err(e) => warn!(id, error = %e, "Ledger checkpoint failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::ledger::{ItemStatus, SharedLedger};
    use crate::observability::Metrics;
    use crate::progress::NoProgress;
    use crate::queue::WorkQueue;
    use crate::storage::FileStore;
    use crate::worker::http::{Fetch, FetchResponse};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubFetcher {
        status: u16,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetch for StubFetcher {
        async fn get(&self, _url: &str) -> crate::worker::http::Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchResponse::from_bytes(self.status, &b"image"[..]))
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetch for FailingFetcher {
        async fn get(&self, _url: &str) -> crate::worker::http::Result<FetchResponse> {
            Err(DownloadError::Timeout)
        }
    }

    fn context(temp: &TempDir, fetcher: Arc<dyn Fetch>) -> WorkerContext {
        WorkerContext {
            ledger: Arc::new(SharedLedger::open(temp.path().join("l.csv"), "0xabc", 10).unwrap()),
            queue: Arc::new(WorkQueue::new()),
            fetcher,
            store: FileStore::new(temp.path().join("out")),
            metrics: Arc::new(Metrics::new()),
            progress: Arc::new(NoProgress),
            checkpoint_interval: 100,
            jitter: DelayRange::ZERO,
        }
    }

    #[tokio::test]
    async fn test_success_writes_file_then_marks_done() {
        let temp = TempDir::new().unwrap();
        let ctx = context(
            &temp,
            Arc::new(StubFetcher {
                status: 200,
                calls: AtomicUsize::new(0),
            }),
        );

        let outcome = process_item(&ctx, &QueueItem::new(4, "http://x/4")).await;

        assert_eq!(outcome, Outcome::Succeeded { bytes: 5 });
        assert_eq!(ctx.ledger.status(4).await, Some(ItemStatus::Succeeded));
        assert_eq!(std::fs::read(ctx.store.path_for(4)).unwrap(), b"image");
        let row = ctx.ledger.snapshot().await;
        assert_eq!(row.row(4).unwrap().image_url.as_deref(), Some("http://x/4"));
    }

    #[tokio::test]
    async fn test_non_200_marks_failed() {
        let temp = TempDir::new().unwrap();
        let ctx = context(
            &temp,
            Arc::new(StubFetcher {
                status: 404,
                calls: AtomicUsize::new(0),
            }),
        );

        let outcome = process_item(&ctx, &QueueItem::new(5, "http://x/5")).await;

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(ctx.ledger.status(5).await, Some(ItemStatus::Failed));
        assert!(!ctx.store.path_for(5).exists());
        assert_eq!(ctx.metrics.snapshot().items_failed, 1);
    }

    #[tokio::test]
    async fn test_network_error_marks_failed() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Arc::new(FailingFetcher));

        let outcome = process_item(&ctx, &QueueItem::new(1, "http://x/1")).await;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(ctx.ledger.status(1).await, Some(ItemStatus::Failed));
    }

    #[tokio::test]
    async fn test_already_succeeded_is_skipped() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher {
            status: 200,
            calls: AtomicUsize::new(0),
        });
        let ctx = context(&temp, fetcher.clone());
        ctx.ledger.record_status(2, true).await.unwrap();

        let outcome = process_item(&ctx, &QueueItem::new(2, "http://x/2")).await;

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_checkpoint_persists_ledger() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Arc::new(FailingFetcher));

        checkpoint(&ctx, 0).await;

        assert!(ctx.ledger.path().exists());
        assert_eq!(ctx.metrics.snapshot().checkpoints, 1);
    }

    #[test]
    fn test_is_checkpoint() {
        assert!(is_checkpoint(0, 100));
        assert!(is_checkpoint(300, 100));
        assert!(!is_checkpoint(99, 100));
        assert!(!is_checkpoint(5, 0));
    }
}
