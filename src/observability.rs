//! Logging setup and run counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// Honors `RUST_LOG`, defaulting to `info`. Logs go to stderr so the report on
/// stdout stays machine-readable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Counters updated by the fetcher pool during one run
#[derive(Debug, Default)]
pub struct Metrics {
    items_succeeded: AtomicU64,
    items_failed: AtomicU64,
    items_skipped: AtomicU64,
    bytes_written: AtomicU64,
    checkpoints: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_succeeded(&self, bytes: u64) {
        self.items_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn item_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "items_failed", "Metric incremented");
    }

    pub fn item_skipped(&self) {
        self.items_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "items_skipped", "Metric incremented");
    }

    pub fn checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_succeeded: self.items_succeeded.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            items_skipped: self.items_skipped.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_succeeded: u64,
    pub items_failed: u64,
    pub items_skipped: u64,
    pub bytes_written: u64,
    pub checkpoints: u64,
}

impl MetricsSnapshot {
    /// Items taken off the queue, whatever their outcome
    pub fn processed(&self) -> u64 {
        self.items_succeeded + self.items_failed + self.items_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.item_succeeded(100);
        metrics.item_succeeded(50);
        metrics.item_failed();
        metrics.item_skipped();
        metrics.checkpoint();

        let snap = metrics.snapshot();
        assert_eq!(snap.items_succeeded, 2);
        assert_eq!(snap.bytes_written, 150);
        assert_eq!(snap.processed(), 4);
        assert_eq!(snap.checkpoints, 1);
    }
}
