//! Merge two bar series into one canonical, bounded series.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::domain::Bar;

/// Merge `series_a` and `series_b`: deduplicate by timestamp with B
/// winning ties (B is the more authoritative source for recent data),
/// sort ascending, keep the most recent `limit` rows.
///
/// Post-condition: strictly increasing, unique timestamps.
pub fn merge(series_a: Vec<Bar>, series_b: Vec<Bar>, limit: usize) -> Vec<Bar> {
    if limit == 0 {
        return Vec::new();
    }

    let mut by_ts: BTreeMap<NaiveDateTime, Bar> = BTreeMap::new();
    for bar in series_a {
        by_ts.insert(bar.timestamp, bar);
    }
    // Inserted second so B overwrites A on equal timestamps.
    for bar in series_b {
        by_ts.insert(bar.timestamp, bar);
    }

    let mut merged: Vec<Bar> = by_ts.into_values().collect();
    if merged.len() > limit {
        merged.drain(..merged.len() - limit);
    }
    merged
}
