//! Storage Layer
//!
//! Assembles one log row per fast tick, appends rows to the CSV log and keeps
//! a bounded window of recent rows in memory for the dashboard.

mod csv_log;
mod repository;
mod row;

pub use csv_log::{log_file_name, CsvLogWriter};
pub use repository::Repository;
pub use row::{format_timestamp, LogRow, RowEmitter, DERIVED_COLUMNS};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{path:?} already holds a log with a different header")]
    HeaderMismatch { path: std::path::PathBuf },
    #[error("Row has {actual} fields, header has {expected}")]
    ColumnMismatch { expected: usize, actual: usize },
    #[error("Lock error: {0}")]
    LockPoisoned(String),
}
