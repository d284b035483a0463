//! Market data acquisition and reconciliation.
//!
//! Two upstream sources feed the pipeline: the Eastmoney intraday kline
//! endpoint (all timeframes, mandatory for 1-minute) and an optional
//! session-authenticated historical gateway (5 minutes and up). Raw rows
//! are normalized to the canonical schema, volume units reconciled between
//! sources, merged into one bounded series, and freshness-checked against
//! the trading calendar.

pub mod freshness;
pub mod historical;
pub mod intraday;
pub mod merge;
pub mod normalize;
pub mod reconcile;
pub mod source;

pub use freshness::{FreshnessOutcome, FreshnessValidator};
pub use historical::SessionHistoricalSource;
pub use intraday::EastmoneyIntradaySource;
pub use merge::merge;
pub use normalize::{clean, RawRow};
pub use reconcile::{
    infer_single_source_scale, plan_two_source, reconcile_volume_units, VolumeAdjustment,
};
pub use source::{BarSource, SourceError};

/// Calendar days of history to request so that `limit` bars of width
/// `timeframe` fit, with slack for weekends and holidays.
///
/// A mainland session is 240 trading minutes; the 1.6 factor plus a flat
/// buffer covers non-trading days in the window.
pub fn lookback_days(timeframe: crate::domain::Timeframe, limit: usize) -> i64 {
    let minutes_needed = limit as u64 * timeframe.minutes() as u64;
    let trading_days = minutes_needed.div_ceil(240);
    (trading_days as f64 * 1.6) as i64 + 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;

    #[test]
    fn lookback_covers_one_minute_window() {
        // 600 one-minute bars fit in 3 sessions; the window stays small.
        let days = lookback_days(Timeframe::M1, 600);
        assert!(days >= 3 && days <= 30, "got {days}");
    }

    #[test]
    fn lookback_scales_with_timeframe() {
        let m5 = lookback_days(Timeframe::M5, 600);
        let m60 = lookback_days(Timeframe::M60, 600);
        assert!(m60 > m5);
        // 600 hourly bars need 150 sessions plus slack.
        assert!(m60 >= 150);
    }
}
