//! Bar — the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One OHLCV observation for a fixed intraday time bucket.
///
/// `timestamp` is the bucket's END time in exchange-local naive time
/// (upstream kline convention: the "09:31" one-minute bar covers
/// 09:30–09:31). Volume is in shares once the series is canonical;
/// unit reconciliation may rescale it, so it stays `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered bar sequence, owned by the pipeline run that produced it.
pub type BarSeries = Vec<Bar>;

impl Bar {
    /// Basic OHLCV sanity check: high >= low, bounds contain open/close,
    /// volume non-negative.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }

    /// Upstream uses a literal zero open as a "missing" sentinel.
    /// The canonical series never contains one (see `data::normalize`).
    pub fn has_zero_open(&self) -> bool {
        self.open == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2025, 8, 25)
                .unwrap()
                .and_hms_opt(9, 35, 0)
                .unwrap(),
            open: 10.0,
            high: 10.5,
            low: 9.8,
            close: 10.3,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 9.7; // below low
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_negative_volume() {
        let mut bar = sample_bar();
        bar.volume = -1.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn zero_open_sentinel() {
        let mut bar = sample_bar();
        assert!(!bar.has_zero_open());
        bar.open = 0.0;
        assert!(bar.has_zero_open());
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
