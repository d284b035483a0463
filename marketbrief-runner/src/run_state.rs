//! Per-day slot completion ledger.
//!
//! Survives process restarts so an external scheduler can invoke the
//! binary as often as it likes: a slot that already completed today is
//! never run again. Persisted as one small JSON object; a malformed
//! file is treated as empty rather than wedging the schedule forever.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("run-state io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run-state encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// date (YYYY-MM-DD) -> slot label -> completion time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState {
    days: BTreeMap<String, BTreeMap<String, NaiveDateTime>>,
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl RunState {
    pub fn is_completed(&self, date: NaiveDate, slot: &str) -> bool {
        self.days
            .get(&day_key(date))
            .map(|slots| slots.contains_key(slot))
            .unwrap_or(false)
    }

    pub fn completed_at(&self, date: NaiveDate, slot: &str) -> Option<NaiveDateTime> {
        self.days.get(&day_key(date))?.get(slot).copied()
    }

    pub fn mark_completed(&mut self, date: NaiveDate, slot: &str, at: NaiveDateTime) {
        self.days
            .entry(day_key(date))
            .or_default()
            .insert(slot.to_string(), at);
    }

    /// Drop whole days older than `retention_days` before `today`.
    /// Returns how many days were removed. Unparseable keys are removed
    /// too; they can only have come from hand edits.
    pub fn prune_older_than(&mut self, today: NaiveDate, retention_days: i64) -> usize {
        let cutoff = today - Duration::days(retention_days);
        let before = self.days.len();
        self.days.retain(|key, _| {
            NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .map(|date| date >= cutoff)
                .unwrap_or(false)
        });
        before - self.days.len()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Day-by-day view for the status command.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, NaiveDateTime>)> {
        self.days.iter().map(|(day, slots)| (day.as_str(), slots))
    }
}

pub trait RunStateStore {
    fn load(&self) -> Result<RunState, StateError>;
    fn save(&self, state: &RunState) -> Result<(), StateError>;
}

/// JSON file store with tmp-then-rename writes.
pub struct JsonRunStateStore {
    path: PathBuf,
}

impl JsonRunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl RunStateStore for JsonRunStateStore {
    /// Missing file is a fresh install; a file that does not parse is
    /// logged and treated as empty so one corrupt write cannot block
    /// every future slot.
    fn load(&self) -> Result<RunState, StateError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no run state yet");
                return Ok(RunState::default());
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(path = %self.path.display(), "run state unreadable, starting empty: {e}");
                Ok(RunState::default())
            }
        }
    }

    fn save(&self, state: &RunState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StateError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct InMemoryRunStateStore {
    state: Mutex<RunState>,
}

impl InMemoryRunStateStore {
    pub fn with_state(state: RunState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> RunState {
        self.state.lock().expect("run state lock poisoned").clone()
    }
}

impl RunStateStore for InMemoryRunStateStore {
    fn load(&self) -> Result<RunState, StateError> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &RunState) -> Result<(), StateError> {
        *self.state.lock().expect("run state lock poisoned") = state.clone();
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn when(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn mark_then_query() {
        let mut state = RunState::default();
        let day = date(2025, 8, 25);
        assert!(!state.is_completed(day, "1140"));

        state.mark_completed(day, "1140", when(2025, 8, 25, 11, 45));
        assert!(state.is_completed(day, "1140"));
        assert!(!state.is_completed(day, "1520"));
        assert_eq!(
            state.completed_at(day, "1140"),
            Some(when(2025, 8, 25, 11, 45))
        );
    }

    #[test]
    fn wire_shape_is_date_slot_timestamp() {
        let mut state = RunState::default();
        state.mark_completed(date(2025, 8, 25), "1140", when(2025, 8, 25, 11, 45));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["2025-08-25"]["1140"], "2025-08-25T11:45:00");
    }

    #[test]
    fn prune_drops_old_days_only() {
        let mut state = RunState::default();
        state.mark_completed(date(2025, 7, 1), "1140", when(2025, 7, 1, 11, 45));
        state.mark_completed(date(2025, 8, 20), "1140", when(2025, 8, 20, 11, 45));
        state.mark_completed(date(2025, 8, 25), "1520", when(2025, 8, 25, 15, 25));

        let removed = state.prune_older_than(date(2025, 8, 25), 30);
        assert_eq!(removed, 1);
        assert!(!state.is_completed(date(2025, 7, 1), "1140"));
        assert!(state.is_completed(date(2025, 8, 20), "1140"));
        assert!(state.is_completed(date(2025, 8, 25), "1520"));
    }

    #[test]
    fn prune_drops_unparseable_day_keys() {
        let mut state: RunState =
            serde_json::from_str(r#"{"garbage": {"1140": "2025-08-25T11:45:00"}}"#).unwrap();
        assert_eq!(state.len(), 1);
        let removed = state.prune_older_than(date(2025, 8, 25), 30);
        assert_eq!(removed, 1);
        assert!(state.is_empty());
    }

    #[test]
    fn json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStateStore::new(dir.path().join("state/run_state.json"));

        assert!(store.load().unwrap().is_empty());

        let mut state = RunState::default();
        state.mark_completed(date(2025, 8, 25), "1140", when(2025, 8, 25, 11, 45));
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
        // The temp file never survives a successful save.
        assert!(!dir.path().join("state/run_state.json.tmp").exists());
    }

    #[test]
    fn malformed_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_state.json");
        fs::write(&path, "{not json").unwrap();

        let store = JsonRunStateStore::new(&path);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn in_memory_store_roundtrip() {
        let store = InMemoryRunStateStore::default();
        let mut state = RunState::default();
        state.mark_completed(date(2025, 8, 25), "1520", when(2025, 8, 25, 15, 22));
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }
}
