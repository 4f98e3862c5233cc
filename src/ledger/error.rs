use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed ledger {path} (line {line}): {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("Ledger {path} is missing column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Unknown item id: {0}")]
    UnknownId(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
