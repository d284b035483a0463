//! Canonical cleaning shared by every bar source.
//!
//! Providers disagree on column names, locales and sentinels; after this
//! pass a series is sorted ascending, every row has a timestamp and a
//! close, and no open is literally zero (the upstream "missing" sentinel,
//! resolved with the prior bar's close, or the current close when there is
//! no prior).

use chrono::NaiveDateTime;

use crate::domain::Bar;

/// A provider row after field renaming and numeric coercion, before
/// cleaning. Fields are optional because upstream payloads blank or drop
/// columns without notice.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub timestamp: Option<NaiveDateTime>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Clean raw rows into canonical bars.
///
/// Rows lacking a timestamp or a close are dropped. Missing high/low fall
/// back to the close; missing or negative volume becomes zero.
pub fn clean(rows: Vec<RawRow>) -> Vec<Bar> {
    let mut bars: Vec<Bar> = rows
        .into_iter()
        .filter_map(|row| {
            let timestamp = row.timestamp?;
            let close = row.close?;
            Some(Bar {
                timestamp,
                open: row.open.unwrap_or(0.0),
                high: row.high.unwrap_or(close),
                low: row.low.unwrap_or(close),
                close,
                volume: row.volume.unwrap_or(0.0).max(0.0),
            })
        })
        .collect();

    bars.sort_by_key(|b| b.timestamp);

    // Zero open is the "missing" sentinel: prior close, else current close.
    let mut prior_close: Option<f64> = None;
    for bar in &mut bars {
        if bar.open == 0.0 {
            bar.open = prior_close.unwrap_or(bar.close);
        }
        prior_close = Some(bar.close);
    }

    bars
}
