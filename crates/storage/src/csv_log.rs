//! CSV log writer

use crate::{LogRow, StorageError};
use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Numbered siblings tried by [`CsvLogWriter::create_or_rotate`]
const MAX_ROTATIONS: u32 = 100;

/// `ecu_log_<YYYYmmdd_HHMMSS>.csv` for a session started at `started`
pub fn log_file_name(started: NaiveDateTime) -> String {
    format!("ecu_log_{}.csv", started.format("%Y%m%d_%H%M%S"))
}

/// Appends formatted rows under a header fixed at construction
pub struct CsvLogWriter<W: Write> {
    writer: csv::Writer<W>,
    columns: usize,
    rows_written: u64,
}

impl<W: Write> CsvLogWriter<W> {
    /// Wrap `writer`; the header is written only if `write_header` is set.
    pub fn new(writer: W, header: &[String], write_header: bool) -> Result<Self, StorageError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        if write_header {
            writer.write_record(header)?;
        }
        Ok(Self {
            writer,
            columns: header.len(),
            rows_written: 0,
        })
    }

    pub fn append(&mut self, row: &LogRow) -> Result<(), StorageError> {
        if row.fields.len() != self.columns {
            return Err(StorageError::ColumnMismatch {
                expected: self.columns,
                actual: row.fields.len(),
            });
        }
        self.writer.write_record(&row.fields)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Rows appended through this writer
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W, StorageError> {
        self.writer
            .into_inner()
            .map_err(|e| StorageError::Io(std::io::Error::new(e.error().kind(), e.to_string())))
    }
}

impl CsvLogWriter<File> {
    /// Open `path` for appending.
    ///
    /// A new or empty file gets the header. An existing non-empty file is
    /// continued without a second header, and only if its header matches.
    pub fn create(path: &Path, header: &[String]) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let existing = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if existing {
            check_existing_header(path, header)?;
            info!("Appending to existing log {:?}", path);
        } else {
            info!("Writing new log {:?}", path);
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::new(file, header, !existing)
    }

    /// Like [`CsvLogWriter::create`], but a file with a different header is
    /// left alone and the log goes to the first free `<stem>_<n>.csv` next to it.
    pub fn create_or_rotate(path: &Path, header: &[String]) -> Result<(Self, PathBuf), StorageError> {
        match Self::create(path, header) {
            Ok(writer) => return Ok((writer, path.to_path_buf())),
            Err(StorageError::HeaderMismatch { .. }) => {}
            Err(e) => return Err(e),
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ecu_log".to_string());
        for n in 1..=MAX_ROTATIONS {
            let candidate = path.with_file_name(format!("{}_{}.csv", stem, n));
            match Self::create(&candidate, header) {
                Ok(writer) => {
                    warn!(
                        "{:?} has a different column layout; logging to {:?} instead",
                        path, candidate
                    );
                    return Ok((writer, candidate));
                }
                Err(StorageError::HeaderMismatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::HeaderMismatch {
            path: path.to_path_buf(),
        })
    }
}

fn check_existing_header(path: &Path, header: &[String]) -> Result<(), StorageError> {
    let existing = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?
        .headers()?
        .clone();

    if existing.iter().eq(header.iter().map(String::as_str)) {
        Ok(())
    } else {
        warn!(
            "Existing log {:?} has a different header ({} columns, expected {})",
            path,
            existing.len(),
            header.len()
        );
        Err(StorageError::HeaderMismatch {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn header() -> Vec<String> {
        ["timestamp", "RPM", "estimated_gear"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn row(ts: u64, rpm: &str, gear: &str) -> LogRow {
        LogRow {
            timestamp_ms: ts,
            fields: vec![ts.to_string(), rpm.to_string(), gear.to_string()],
        }
    }

    #[test]
    fn test_file_name() {
        let started = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(7, 5, 1))
            .unwrap();
        assert_eq!(log_file_name(started), "ecu_log_20240309_070501.csv");
    }

    #[test]
    fn test_blank_fields_stay_blank() {
        let mut writer = CsvLogWriter::new(Vec::new(), &header(), true).unwrap();
        writer.append(&row(1, "", "?")).unwrap();
        writer.append(&row(2, "812", "N")).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text, "timestamp,RPM,estimated_gear\n1,,?\n2,812,N\n");
    }

    #[test]
    fn test_column_mismatch_rejected() {
        let mut writer = CsvLogWriter::new(Vec::new(), &header(), true).unwrap();
        let short = LogRow {
            timestamp_ms: 1,
            fields: vec!["1".to_string()],
        };
        assert!(matches!(
            writer.append(&short),
            Err(StorageError::ColumnMismatch {
                expected: 3,
                actual: 1
            })
        ));
        assert_eq!(writer.rows_written(), 0);
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ecu_log_test.csv");

        let mut first = CsvLogWriter::create(&path, &header()).unwrap();
        first.append(&row(1, "800", "N")).unwrap();
        first.flush().unwrap();
        drop(first);

        let mut second = CsvLogWriter::create(&path, &header()).unwrap();
        second.append(&row(2, "", "?")).unwrap();
        second.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "timestamp,RPM,estimated_gear\n1,800,N\n2,,?\n");
    }

    #[test]
    fn test_different_header_is_not_appended_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu_log_test.csv");
        std::fs::write(&path, "timestamp,SPEED\n1,40\n").unwrap();

        let err = CsvLogWriter::create(&path, &header()).err().unwrap();
        assert!(matches!(err, StorageError::HeaderMismatch { .. }));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,SPEED\n1,40\n"
        );
    }

    #[test]
    fn test_rotate_to_numbered_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu_log_test.csv");
        std::fs::write(&path, "timestamp,SPEED\n1,40\n").unwrap();
        std::fs::write(dir.path().join("ecu_log_test_1.csv"), "other\n").unwrap();

        let (mut writer, used) = CsvLogWriter::create_or_rotate(&path, &header()).unwrap();
        assert_eq!(used, dir.path().join("ecu_log_test_2.csv"));
        writer.append(&row(1, "800", "N")).unwrap();
        writer.flush().unwrap();

        assert_eq!(
            std::fs::read_to_string(&used).unwrap(),
            "timestamp,RPM,estimated_gear\n1,800,N\n"
        );
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,SPEED\n1,40\n"
        );
    }

    #[test]
    fn test_rotate_keeps_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu_log_test.csv");
        std::fs::write(&path, "timestamp,RPM,estimated_gear\n1,800,N\n").unwrap();

        let (_, used) = CsvLogWriter::create_or_rotate(&path, &header()).unwrap();
        assert_eq!(used, path);
    }
}
