//! Repository Implementation

use crate::{LogRow, StorageError};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

/// Bounded in-memory window of recent log rows
pub struct Repository {
    rows: Mutex<VecDeque<LogRow>>,
    max_rows: usize,
}

impl Repository {
    /// Create a repository keeping the default 100 000 rows (~28 h at 1 Hz)
    pub fn new() -> Self {
        Self::with_capacity(100_000)
    }

    pub fn with_capacity(max_rows: usize) -> Self {
        info!("Creating in-memory row repository ({} rows)", max_rows);
        Self {
            rows: Mutex::new(VecDeque::with_capacity(max_rows.min(10_000))),
            max_rows: max_rows.max(1),
        }
    }

    /// Insert a row, evicting the oldest beyond capacity
    pub fn insert_row(&self, row: LogRow) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        while rows.len() >= self.max_rows {
            rows.pop_front();
        }
        rows.push_back(row);
        Ok(())
    }

    /// Most recent `limit` rows, oldest first
    pub fn recent(&self, limit: usize) -> Result<Vec<LogRow>, StorageError> {
        let rows = self
            .rows
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        let skip = rows.len().saturating_sub(limit);
        Ok(rows.iter().skip(skip).cloned().collect())
    }

    /// Rows stamped at or after `since_ms`, oldest first
    pub fn since(&self, since_ms: u64) -> Result<Vec<LogRow>, StorageError> {
        let rows = self
            .rows
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        Ok(rows
            .iter()
            .filter(|r| r.timestamp_ms >= since_ms)
            .cloned()
            .collect())
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: u64) -> LogRow {
        LogRow {
            timestamp_ms: ts,
            fields: vec![ts.to_string()],
        }
    }

    #[test]
    fn test_insert_and_recent() {
        let repo = Repository::new();
        for ts in 1..=5 {
            repo.insert_row(row(ts)).unwrap();
        }

        let recent = repo.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp_ms, 4);
        assert_eq!(recent[1].timestamp_ms, 5);
        assert_eq!(repo.recent(100).unwrap().len(), 5);
    }

    #[test]
    fn test_retention() {
        let repo = Repository::with_capacity(3);
        for ts in 1..=10 {
            repo.insert_row(row(ts)).unwrap();
        }
        assert_eq!(repo.row_count(), 3);
        assert_eq!(repo.recent(10).unwrap()[0].timestamp_ms, 8);
    }

    #[test]
    fn test_since() {
        let repo = Repository::new();
        for ts in [1_000, 2_000, 3_000] {
            repo.insert_row(row(ts)).unwrap();
        }
        let rows = repo.since(2_000).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp_ms, 2_000);
    }
}
