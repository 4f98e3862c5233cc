/// Durable per-item status table
///
/// The ledger is the single source of truth for which ids are done. It lives
/// in a CSV file with one row per id:
///
/// ```text
/// id,contract,image_url,status
/// 0,0xb47e...,https://img.rarible.com/.../0xb47e...:0,True
/// 1,0xb47e...,https://img.rarible.com/.../0xb47e...:1,False
/// 2,0xb47e...,,
/// ```
///
/// `True` means the image file is fully written. `False` (attempted and failed)
/// and an empty cell (never attempted) are both picked up again by the next run.
///
/// ## Usage
///
/// ```rust,ignore
/// use bulkfetch::ledger::SharedLedger;
///
/// let ledger = SharedLedger::open("metadata/punks.csv", "0xb47e", 10_000)?;
/// let batch = ledger.pending_ids(1000).await;
/// ledger.record_status(batch[0], true).await?;
/// ledger.persist().await?;
/// ```

pub mod error;
pub mod shared;
pub mod store;

pub use error::{LedgerError, Result};
pub use shared::SharedLedger;
pub use store::{ItemStatus, Ledger, LedgerRow, LedgerSummary};
