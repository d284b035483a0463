//! Chart overlay indicators.
//!
//! Only the two moving averages the report renders. Overlays are
//! computed once per merged series and travel with it into the prompt
//! CSV and the chart sidecar, blank during warmup.

pub mod sma;

pub use sma::Sma;

/// Fast overlay period (bars).
pub const MA_FAST_PERIOD: usize = 50;
/// Slow overlay period (bars).
pub const MA_SLOW_PERIOD: usize = 200;

/// The ma50/ma200 columns for one series. Values are NaN until the
/// window fills; encoders render NaN as an empty cell.
#[derive(Debug, Clone)]
pub struct ChartOverlays {
    pub ma50: Vec<f64>,
    pub ma200: Vec<f64>,
}

impl ChartOverlays {
    pub fn compute(bars: &[crate::domain::Bar]) -> Self {
        Self {
            ma50: Sma::new(MA_FAST_PERIOD).compute(bars),
            ma200: Sma::new(MA_SLOW_PERIOD).compute(bars),
        }
    }
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLCV on a 5-minute grid: open = prev_close (or
/// close for the first bar), high/low bracket open and close.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let base = chrono::NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(9, 35, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::minutes(5 * i as i64),
                open,
                high: open.max(close) + 0.05,
                low: open.min(close) - 0.05,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlays_share_series_length() {
        let closes: Vec<f64> = (0..220).map(|i| 10.0 + i as f64 * 0.01).collect();
        let bars = make_bars(&closes);
        let overlays = ChartOverlays::compute(&bars);

        assert_eq!(overlays.ma50.len(), 220);
        assert_eq!(overlays.ma200.len(), 220);
        assert!(overlays.ma50[48].is_nan());
        assert!(overlays.ma50[49].is_finite());
        assert!(overlays.ma200[198].is_nan());
        assert!(overlays.ma200[199].is_finite());
    }

    #[test]
    fn short_series_is_all_warmup() {
        let bars = make_bars(&[10.0, 10.1, 10.2]);
        let overlays = ChartOverlays::compute(&bars);
        assert!(overlays.ma50.iter().all(|v| v.is_nan()));
        assert!(overlays.ma200.iter().all(|v| v.is_nan()));
    }
}
