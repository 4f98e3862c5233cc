use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::error::Result;
use super::store::{ItemStatus, Ledger, LedgerSummary};

/// The ledger as shared by the fetcher pool
///
/// Row mutations go through one `RwLock`, so a row is never observed half
/// written. Persistence is serialised separately so two checkpoints can't
/// interleave their temp-file writes; the table is only read-locked long
/// enough to serialise it.
#[derive(Debug)]
pub struct SharedLedger {
    path: PathBuf,
    table: RwLock<Ledger>,
    persist_lock: Mutex<()>,
}

impl SharedLedger {
    pub fn new(path: impl Into<PathBuf>, ledger: Ledger) -> Self {
        Self {
            path: path.into(),
            table: RwLock::new(ledger),
            persist_lock: Mutex::new(()),
        }
    }

    /// Load the ledger at `path`, or create `n` fresh rows
    pub fn open(path: impl Into<PathBuf>, contract: &str, n: u64) -> Result<Self> {
        let path = path.into();
        let ledger = Ledger::load_or_init(&path, contract, n)?;
        Ok(Self::new(path, ledger))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn status(&self, id: u64) -> Option<ItemStatus> {
        self.table.read().await.status(id)
    }

    pub async fn is_succeeded(&self, id: u64) -> bool {
        self.status(id).await.is_some_and(|s| s.is_done())
    }

    pub async fn pending_ids(&self, limit: usize) -> Vec<u64> {
        self.table.read().await.pending_ids(limit)
    }

    pub async fn record_url(&self, id: u64, url: &str) -> Result<()> {
        self.table.write().await.record_url(id, url)
    }

    pub async fn record_status(&self, id: u64, ok: bool) -> Result<()> {
        self.table.write().await.record_status(id, ok)
    }

    pub async fn count_failed(&self) -> u64 {
        self.table.read().await.count_failed()
    }

    pub async fn count_succeeded(&self) -> u64 {
        self.table.read().await.count_succeeded()
    }

    pub async fn summary(&self) -> LedgerSummary {
        self.table.read().await.summary()
    }

    /// Copy of the current table
    pub async fn snapshot(&self) -> Ledger {
        self.table.read().await.clone()
    }

    /// Write the full table to the ledger path
    pub async fn persist(&self) -> Result<()> {
        self.persist_to(&self.path).await
    }

    /// Write the full table to `path` via a temp file and rename
    pub async fn persist_to(&self, path: &Path) -> Result<()> {
        let _guard = self.persist_lock.lock().await;

        let bytes = self.table.read().await.to_csv()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), bytes = bytes.len(), "Ledger persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persist_then_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metadata").join("proj.csv");

        let ledger = SharedLedger::open(&path, "0xabc", 3).unwrap();
        ledger.record_url(0, "http://x/0").await.unwrap();
        ledger.record_status(0, true).await.unwrap();
        ledger.record_status(1, false).await.unwrap();
        ledger.persist().await.unwrap();

        assert!(path.exists());
        assert!(!temp.path().join("metadata").join("proj.csv.tmp").exists());

        let reopened = SharedLedger::open(&path, "0xabc", 3).unwrap();
        assert_eq!(reopened.pending_ids(10).await, vec![1, 2]);
        assert!(reopened.is_succeeded(0).await);
        assert_eq!(reopened.count_failed().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_and_checkpoints() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("proj.csv");
        let ledger = Arc::new(SharedLedger::open(&path, "0xabc", 200).unwrap());

        let mut handles = Vec::new();
        for worker in 0..4u64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                for id in (worker..200).step_by(4) {
                    ledger.record_url(id, &format!("http://x/{}", id)).await.unwrap();
                    ledger.record_status(id, id % 2 == 0).await.unwrap();
                    if id % 25 == 0 {
                        ledger.persist().await.unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        ledger.persist().await.unwrap();

        let summary = ledger.summary().await;
        assert_eq!(summary.succeeded, 100);
        assert_eq!(summary.failed, 100);
        assert_eq!(summary.pending, 0);

        let reloaded = Ledger::read(&path, "0xabc", 200).unwrap();
        assert_eq!(reloaded.count_succeeded(), 100);
        assert_eq!(reloaded.row(7).unwrap().image_url.as_deref(), Some("http://x/7"));
    }
}
