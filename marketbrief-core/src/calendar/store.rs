//! CSV-file calendar cache.
//!
//! One `trade_date` column, canonical `YYYY-MM-DD` rows. Writes are atomic
//! (write to .tmp, rename into place); age comes from the file's mtime so
//! an untouched cache naturally expires.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use tracing::warn;

use super::CalendarError;

/// A loaded cache copy: the date set plus how old the copy is.
#[derive(Debug, Clone)]
pub struct StoredCalendar {
    pub dates: BTreeSet<NaiveDate>,
    pub age: Duration,
}

/// Storage seam for the calendar cache.
pub trait CalendarStore {
    /// `Ok(None)` when no cache exists yet.
    fn load(&self) -> Result<Option<StoredCalendar>, CalendarError>;

    fn save(&self, dates: &BTreeSet<NaiveDate>) -> Result<(), CalendarError>;
}

/// File-backed store (`data/trade_calendar_sina.csv` in production).
pub struct CsvCalendarStore {
    path: PathBuf,
}

impl CsvCalendarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalendarStore for CsvCalendarStore {
    fn load(&self) -> Result<Option<StoredCalendar>, CalendarError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let meta = fs::metadata(&self.path)
            .map_err(|e| CalendarError::Store(format!("stat {}: {e}", self.path.display())))?;
        let age = meta
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or_default();

        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| CalendarError::Store(format!("open {}: {e}", self.path.display())))?;

        let mut dates = BTreeSet::new();
        let mut malformed = 0usize;
        for record in reader.records() {
            let record =
                record.map_err(|e| CalendarError::Store(format!("read cache row: {e}")))?;
            let Some(field) = record.get(0) else {
                malformed += 1;
                continue;
            };
            match NaiveDate::parse_from_str(field.trim(), "%Y-%m-%d") {
                Ok(date) => {
                    dates.insert(date);
                }
                Err(_) => malformed += 1,
            }
        }
        if malformed > 0 {
            warn!(malformed, "skipped malformed calendar cache rows");
        }

        Ok(Some(StoredCalendar { dates, age }))
    }

    fn save(&self, dates: &BTreeSet<NaiveDate>) -> Result<(), CalendarError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CalendarError::Store(format!("create cache dir: {e}")))?;
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["trade_date"])
            .map_err(|e| CalendarError::Store(format!("write header: {e}")))?;
        for date in dates {
            writer
                .write_record([date.format("%Y-%m-%d").to_string()])
                .map_err(|e| CalendarError::Store(format!("write row: {e}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| CalendarError::Store(format!("flush cache: {e}")))?;

        let tmp_path = self.path.with_extension("csv.tmp");
        fs::write(&tmp_path, bytes)
            .map_err(|e| CalendarError::Store(format!("write tmp cache: {e}")))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CalendarError::Store(format!("atomic rename failed: {e}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_file_loads_none() {
        let tmp = TempDir::new().unwrap();
        let store = CsvCalendarStore::new(tmp.path().join("trade_calendar_sina.csv"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = CsvCalendarStore::new(tmp.path().join("trade_calendar_sina.csv"));

        let dates: BTreeSet<NaiveDate> =
            [date(2025, 8, 25), date(2025, 8, 26)].into_iter().collect();
        store.save(&dates).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.dates, dates);
        // Freshly written cache reports near-zero age.
        assert!(loaded.age.as_secs() < 120);
    }

    #[test]
    fn save_creates_parent_dir() {
        let tmp = TempDir::new().unwrap();
        let store = CsvCalendarStore::new(tmp.path().join("data/trade_calendar_sina.csv"));
        store.save(&[date(2025, 8, 25)].into_iter().collect()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("trade_calendar_sina.csv");
        fs::write(&path, "trade_date\n2025-08-25\nnot-a-date\n2025-08-26\n").unwrap();

        let store = CsvCalendarStore::new(&path);
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.dates.len(), 2);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let store = CsvCalendarStore::new(tmp.path().join("trade_calendar_sina.csv"));

        store.save(&[date(2025, 8, 25)].into_iter().collect()).unwrap();
        store.save(&[date(2025, 8, 26)].into_iter().collect()).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(!loaded.dates.contains(&date(2025, 8, 25)));
        assert!(loaded.dates.contains(&date(2025, 8, 26)));
    }
}
