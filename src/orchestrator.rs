//! Run orchestration
//!
//! One run moves strictly forward through
//! `Init -> Seeded -> Running -> Draining -> Done`:
//!
//! 1. **Init**: create output directories, load or create the ledger
//! 2. **Seeded**: queue up to `batch_size` pending ids with their URLs
//! 3. **Running**: spawn the fetcher pool, staggered
//! 4. **Draining**: wait until every queued item is processed (or shutdown is requested)
//! 5. **Done**: stop the pool, persist the ledger, build the report
//!
//! Failed items are not retried within a run; they stay pending in the ledger
//! and are picked up by the next invocation.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::humanize::ByteSize;
use crate::ledger::{LedgerError, SharedLedger};
use crate::observability::Metrics;
use crate::progress::{NoProgress, Progress, ProgressTracker};
use crate::queue::{QueueItem, WorkQueue};
use crate::report::RunReport;
use crate::storage::{FileStore, StorageError};
use crate::url::compose_url;
use crate::worker::{DownloadError, Fetch, FetcherPool, HttpClient, WorkerContext};

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] DownloadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Seeded,
    Running,
    Draining,
    Done,
}

pub struct Orchestrator {
    config: Config,
    fetcher: Arc<dyn Fetch>,
    show_progress: bool,
    phase: Phase,
}

impl Orchestrator {
    /// Orchestrator fetching over HTTP with settings from `config.http`
    pub fn new(config: Config) -> Result<Self> {
        let client = HttpClient::new(&config.http)?;
        Self::with_fetcher(config, Arc::new(client))
    }

    /// Orchestrator over any `Fetch`; rejects configs that fail validation
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            show_progress: false,
            phase: Phase::Init,
        })
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one batch to completion
    pub async fn run(&mut self) -> Result<RunReport> {
        self.run_until(std::future::pending()).await
    }

    /// Run one batch, stopping early if `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        self.phase = Phase::Init;
        let config = self.config.clone();
        let project = &config.project;
        let download = &config.download;
        info!(
            project = %project.name,
            contract = %project.contract,
            size = project.size,
            "Starting run"
        );

        // Init
        let store = FileStore::new(config.output_dir())
            .with_max_bytes(config.http.max_body_bytes.as_u64());
        store.ensure_root().await?;
        tokio::fs::create_dir_all(&download.metadata_dir).await?;

        let ledger = Arc::new(SharedLedger::open(
            config.ledger_path(),
            &project.contract,
            project.size,
        )?);

        let previous_failures = ledger.count_failed().await;
        if previous_failures > 0 {
            info!(
                previous_failures,
                "Previous failed downloads found, retrying them"
            );
        }

        // Seeded
        let batch = ledger.pending_ids(download.batch_size).await;
        let queue = Arc::new(WorkQueue::new());
        for &id in &batch {
            let url = compose_url(&download.url_template, &project.contract, id);
            queue.push(QueueItem::new(id, url));
        }
        self.transition(Phase::Seeded);
        info!(scheduled = batch.len(), "Batch queued");

        let metrics = Arc::new(Metrics::new());

        if batch.is_empty() {
            info!("Nothing to do, every item is already downloaded");
            self.transition(Phase::Done);
            ledger.persist().await?;
            return Ok(self
                .build_report(&ledger, &metrics, 0, 0, Duration::ZERO, previous_failures, false)
                .await);
        }

        // Running
        let progress: Arc<dyn Progress> = if self.show_progress {
            Arc::new(ProgressTracker::new(batch.len() as u64))
        } else {
            Arc::new(NoProgress)
        };

        let ctx = Arc::new(WorkerContext {
            ledger: ledger.clone(),
            queue: queue.clone(),
            fetcher: self.fetcher.clone(),
            store,
            metrics: metrics.clone(),
            progress: progress.clone(),
            checkpoint_interval: download.checkpoint_interval,
            jitter: download.jitter,
        });

        let workers = download.workers.min(batch.len());
        let started = Instant::now();
        self.transition(Phase::Running);
        let pool = FetcherPool::spawn(ctx, workers, download.startup_stagger).await;

        // Draining
        self.transition(Phase::Draining);
        let interrupted = tokio::select! {
            _ = queue.join() => false,
            _ = shutdown => {
                warn!(
                    unfinished = queue.unfinished(),
                    "Shutdown requested, stopping before the batch is finished"
                );
                true
            }
        };
        let elapsed = started.elapsed();

        // Done
        self.transition(Phase::Done);
        let aborted = pool.shutdown(download.shutdown_grace()).await;
        if aborted > 0 {
            warn!(aborted, "Some workers were aborted mid-item");
        }
        progress.finish();

        ledger.persist().await?;
        debug!(path = %ledger.path().display(), "Final ledger persisted");

        let report = self
            .build_report(
                &ledger,
                &metrics,
                workers,
                batch.len(),
                elapsed,
                previous_failures,
                interrupted,
            )
            .await;

        info!(
            scheduled = report.scheduled,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Run finished"
        );
        Ok(report)
    }

    fn transition(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phases only move forward");
        debug!(from = ?self.phase, to = ?next, "Phase transition");
        self.phase = next;
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_report(
        &self,
        ledger: &SharedLedger,
        metrics: &Metrics,
        workers: usize,
        scheduled: usize,
        elapsed: Duration,
        previous_failures: u64,
        interrupted: bool,
    ) -> RunReport {
        let summary = ledger.summary().await;
        let snapshot = metrics.snapshot();

        RunReport {
            project: self.config.project.name.clone(),
            workers,
            scheduled,
            elapsed,
            succeeded: summary.succeeded,
            failed: summary.failed,
            pending: summary.pending,
            total: self.config.project.size,
            previous_failures,
            bytes_written: ByteSize(snapshot.bytes_written),
            checkpoints: snapshot.checkpoints,
            interrupted,
        }
    }
}
