use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, Semaphore};
use tracing::debug;

/// One unit of work: an item id and the URL to fetch it from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: u64,
    pub url: String,
}

impl QueueItem {
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }
}

/// FIFO queue shared by the fetcher pool
///
/// Completion is two-phase: an item counts as outstanding from `push` until its
/// consumer calls `task_done`, and `join` waits for the outstanding count to
/// reach zero. Every pushed item adds one semaphore permit, so a successful
/// `pop` always finds an item behind its permit.
#[derive(Debug)]
pub struct WorkQueue {
    items: Mutex<VecDeque<QueueItem>>,
    available: Semaphore,
    unfinished: AtomicUsize,
    drained: Notify,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
            unfinished: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Enqueue without blocking
    pub fn push(&self, item: QueueItem) {
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        self.lock_items().push_back(item);
        self.available.add_permits(1);
    }

    /// Wait for the next item; `None` once the queue is closed
    pub async fn pop(&self) -> Option<QueueItem> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();
        self.lock_items().pop_front()
    }

    /// Mark one popped item as fully processed
    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        match previous {
            Ok(1) => {
                debug!("Work queue drained");
                self.drained.notify_waiters();
            }
            Ok(_) => {}
            Err(_) => debug!("task_done called more times than items were pushed"),
        }
    }

    /// Wait until every pushed item has been popped and marked done
    pub async fn join(&self) {
        loop {
            // Registered before the check so a concurrent notify_waiters isn't lost
            let notified = self.drained.notified();
            if self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wake every waiting `pop` with `None`; items still queued are abandoned
    pub fn close(&self) {
        self.available.close();
    }

    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }

    /// Items pushed but not yet popped
    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items pushed but not yet marked done
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, VecDeque<QueueItem>> {
        // The guarded deque has no invariant a panicking holder could break
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
