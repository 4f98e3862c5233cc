use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{LedgerError, Result};

pub const HEADER: [&str; 4] = ["id", "contract", "image_url", "status"];

/// Download state of one item
///
/// `Pending` and `Failed` are both retried on the next run; they are kept apart
/// so the ledger file shows which ids were attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Failed,
    Succeeded,
}

impl ItemStatus {
    fn from_cell(cell: &str) -> Option<Self> {
        match cell.trim() {
            "" | "nan" | "NaN" => Some(ItemStatus::Pending),
            "True" | "true" | "1" => Some(ItemStatus::Succeeded),
            "False" | "false" | "0" => Some(ItemStatus::Failed),
            _ => None,
        }
    }

    fn as_cell(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "",
            ItemStatus::Failed => "False",
            ItemStatus::Succeeded => "True",
        }
    }

    pub fn is_done(&self) -> bool {
        *self == ItemStatus::Succeeded
    }
}

impl From<bool> for ItemStatus {
    fn from(ok: bool) -> Self {
        if ok {
            ItemStatus::Succeeded
        } else {
            ItemStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub id: u64,
    pub contract: String,
    pub image_url: Option<String>,
    pub status: ItemStatus,
}

impl LedgerRow {
    fn fresh(id: u64, contract: &str) -> Self {
        Self {
            id,
            contract: contract.to_string(),
            image_url: None,
            status: ItemStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total: u64,
    pub pending: u64,
    pub failed: u64,
    pub succeeded: u64,
}

/// Per-item status table, one row per id in `0..n`
///
/// `rows[i].id == i` always holds.
#[derive(Debug, Clone)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
}

impl Ledger {
    /// `n` pending rows carrying `contract`
    pub fn fresh(contract: &str, n: u64) -> Self {
        Self {
            rows: (0..n).map(|id| LedgerRow::fresh(id, contract)).collect(),
        }
    }

    /// Load `path` if it exists, otherwise start fresh
    pub fn load_or_init(path: &Path, contract: &str, n: u64) -> Result<Self> {
        if path.exists() {
            let ledger = Self::read(path, contract, n)?;
            let summary = ledger.summary();
            info!(
                path = %path.display(),
                succeeded = summary.succeeded,
                failed = summary.failed,
                pending = summary.pending,
                "Loaded ledger"
            );
            Ok(ledger)
        } else {
            info!(path = %path.display(), n, "No ledger found, starting fresh");
            Ok(Self::fresh(contract, n))
        }
    }

    /// Parse a ledger file
    ///
    /// The first column is the id whatever its header says. Ids `>= n` are dropped
    /// unchecked and ids missing from the file come back as pending rows.
    pub fn read(path: &Path, contract: &str, n: u64) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let column = |name: &'static str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| LedgerError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name,
                })
        };
        let contract_col = column("contract")?;
        let url_col = column("image_url")?;
        let status_col = column("status")?;
        if [contract_col, url_col, status_col].contains(&0) {
            return Err(LedgerError::MissingColumn {
                path: path.to_path_buf(),
                column: "id",
            });
        }

        let malformed = |line: u64, reason: String| LedgerError::Malformed {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut slots: Vec<Option<LedgerRow>> = vec![None; n as usize];
        let mut seen = HashSet::new();
        let mut dropped = 0u64;

        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

            let id: u64 = cell(0)
                .parse()
                .map_err(|_| malformed(line, format!("invalid id '{}'", cell(0))))?;
            // Rows past the configured size are dropped before any other cell is checked
            if id >= n {
                dropped += 1;
                continue;
            }
            if !seen.insert(id) {
                return Err(malformed(line, format!("duplicate id {}", id)));
            }

            let status = ItemStatus::from_cell(cell(status_col))
                .ok_or_else(|| malformed(line, format!("invalid status '{}'", cell(status_col))))?;

            let row_contract = match cell(contract_col) {
                "" => contract.to_string(),
                c => c.to_string(),
            };
            let image_url = match cell(url_col) {
                "" => None,
                u => Some(u.to_string()),
            };

            slots[id as usize] = Some(LedgerRow {
                id,
                contract: row_contract,
                image_url,
                status,
            });
        }

        if dropped > 0 {
            warn!(dropped, n, "Ignoring ledger rows beyond the configured size");
        }

        let rows: Vec<LedgerRow> = slots
            .into_iter()
            .enumerate()
            .map(|(id, slot)| slot.unwrap_or_else(|| LedgerRow::fresh(id as u64, contract)))
            .collect();

        debug!(rows = rows.len(), "Parsed ledger");
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: u64) -> Option<&LedgerRow> {
        self.rows.get(id as usize)
    }

    pub fn status(&self, id: u64) -> Option<ItemStatus> {
        self.row(id).map(|r| r.status)
    }

    /// Up to `limit` ids not yet succeeded, ascending
    pub fn pending_ids(&self, limit: usize) -> Vec<u64> {
        self.rows
            .iter()
            .filter(|r| !r.status.is_done())
            .map(|r| r.id)
            .take(limit)
            .collect()
    }

    pub fn record_url(&mut self, id: u64, url: &str) -> Result<()> {
        let row = self.row_mut(id)?;
        row.image_url = Some(url.to_string());
        Ok(())
    }

    pub fn record_status(&mut self, id: u64, ok: bool) -> Result<()> {
        let row = self.row_mut(id)?;
        row.status = ItemStatus::from(ok);
        Ok(())
    }

    fn row_mut(&mut self, id: u64) -> Result<&mut LedgerRow> {
        self.rows
            .get_mut(id as usize)
            .ok_or(LedgerError::UnknownId(id))
    }

    pub fn count_failed(&self) -> u64 {
        self.count(ItemStatus::Failed)
    }

    pub fn count_succeeded(&self) -> u64 {
        self.count(ItemStatus::Succeeded)
    }

    fn count(&self, status: ItemStatus) -> u64 {
        self.rows.iter().filter(|r| r.status == status).count() as u64
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            total: self.rows.len() as u64,
            ..Default::default()
        };
        for row in &self.rows {
            match row.status {
                ItemStatus::Pending => summary.pending += 1,
                ItemStatus::Failed => summary.failed += 1,
                ItemStatus::Succeeded => summary.succeeded += 1,
            }
        }
        summary
    }

    /// Serialize the whole table as CSV
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(HEADER)?;
        for row in &self.rows {
            writer.write_record([
                row.id.to_string().as_str(),
                row.contract.as_str(),
                row.image_url.as_deref().unwrap_or(""),
                row.status.as_cell(),
            ])?;
        }
        writer
            .into_inner()
            .map_err(|e| LedgerError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CONTRACT: &str = "0xabc";

    fn write_ledger(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("ledger.csv");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_fresh_when_missing() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::load_or_init(&temp.path().join("none.csv"), CONTRACT, 5).unwrap();

        assert_eq!(ledger.len(), 5);
        assert_eq!(ledger.pending_ids(10), vec![0, 1, 2, 3, 4]);
        assert_eq!(ledger.row(3).unwrap().contract, CONTRACT);
        assert_eq!(ledger.count_failed(), 0);
    }

    #[test]
    fn test_resume_selects_failed_and_unset() {
        let temp = TempDir::new().unwrap();
        let path = write_ledger(
            &temp,
            "id,contract,image_url,status\n\
             0,0xabc,http://x/0,True\n\
             1,0xabc,http://x/1,False\n\
             2,0xabc,,\n",
        );

        let ledger = Ledger::load_or_init(&path, CONTRACT, 3).unwrap();
        assert_eq!(ledger.pending_ids(10), vec![1, 2]);
        assert_eq!(ledger.status(1), Some(ItemStatus::Failed));
        assert_eq!(ledger.status(2), Some(ItemStatus::Pending));
        assert_eq!(ledger.count_succeeded(), 1);
        assert_eq!(ledger.count_failed(), 1);
    }

    #[test]
    fn test_pending_ids_bounded_and_idempotent() {
        let ledger = Ledger::fresh(CONTRACT, 1000);
        let first = ledger.pending_ids(50);
        assert_eq!(first.len(), 50);
        assert_eq!(first, (0..50).collect::<Vec<_>>());
        assert_eq!(ledger.pending_ids(50), first);
    }

    #[test]
    fn test_accepts_unnamed_index_header() {
        let temp = TempDir::new().unwrap();
        let path = write_ledger(
            &temp,
            ",contract,image_url,status\n0,0xabc,http://x/0,True\n1,0xabc,,\n",
        );

        let ledger = Ledger::read(&path, CONTRACT, 2).unwrap();
        assert_eq!(ledger.pending_ids(10), vec![1]);
    }

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");

        let mut ledger = Ledger::fresh(CONTRACT, 4);
        ledger.record_url(0, "http://x/0").unwrap();
        ledger.record_status(0, true).unwrap();
        ledger.record_url(1, "http://x/1").unwrap();
        ledger.record_status(1, false).unwrap();
        fs::write(&path, ledger.to_csv().unwrap()).unwrap();

        let reloaded = Ledger::read(&path, CONTRACT, 4).unwrap();
        for id in 0..4 {
            assert_eq!(reloaded.row(id), ledger.row(id));
        }
    }

    #[test]
    fn test_missing_rows_filled_and_extra_rows_dropped() {
        let temp = TempDir::new().unwrap();
        let path = write_ledger(
            &temp,
            "id,contract,image_url,status\n1,,http://x/1,True\n7,0xabc,,True\n",
        );

        let ledger = Ledger::read(&path, CONTRACT, 3).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.pending_ids(10), vec![0, 2]);
        // blank contract cell takes the configured contract
        assert_eq!(ledger.row(1).unwrap().contract, CONTRACT);
    }

    #[test]
    fn test_dropped_rows_are_not_validated() {
        let temp = TempDir::new().unwrap();
        let path = write_ledger(
            &temp,
            "id,contract,image_url,status\n0,0xabc,,True\n5,0xabc,,garbage\n5,0xabc,,\n",
        );

        let ledger = Ledger::read(&path, CONTRACT, 2).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pending_ids(10), vec![1]);
    }

    #[test]
    fn test_malformed_status() {
        let temp = TempDir::new().unwrap();
        let path = write_ledger(&temp, "id,contract,image_url,status\n0,0xabc,,maybe\n");

        let err = Ledger::read(&path, CONTRACT, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_malformed_id_and_duplicates() {
        let temp = TempDir::new().unwrap();
        let path = write_ledger(&temp, "id,contract,image_url,status\nzero,0xabc,,\n");
        assert!(matches!(
            Ledger::read(&path, CONTRACT, 1),
            Err(LedgerError::Malformed { .. })
        ));

        let path = write_ledger(&temp, "id,contract,image_url,status\n0,0xabc,,\n0,0xabc,,\n");
        assert!(matches!(
            Ledger::read(&path, CONTRACT, 1),
            Err(LedgerError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_column() {
        let temp = TempDir::new().unwrap();
        let path = write_ledger(&temp, "id,contract,image_url\n0,0xabc,\n");

        let err = Ledger::read(&path, CONTRACT, 1).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MissingColumn {
                column: "status",
                ..
            }
        ));
    }

    #[test]
    fn test_record_unknown_id() {
        let mut ledger = Ledger::fresh(CONTRACT, 2);
        assert!(matches!(
            ledger.record_status(2, true),
            Err(LedgerError::UnknownId(2))
        ));
    }
}
