//! Staleness detection and repair for fetched bar series.
//!
//! Upstream caches sometimes serve series whose last bar is hours old.
//! On a trading day the validator compares the last bar against the
//! calendar's expected last-completed bar end; a stale series gets one
//! repair attempt by refetching the recent window from the intraday
//! source and re-merging.

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::calendar::TradingCalendar;
use crate::data::merge::merge;
use crate::data::source::BarSource;
use crate::domain::{Bar, SymbolCode, Timeframe};

/// Days of history re-requested when a series turns out stale.
pub const REFETCH_WINDOW_DAYS: i64 = 7;

/// Acceptable lag behind the expected last bar end, in minutes.
///
/// Two bar widths covers a bar still forming plus upstream publish delay;
/// the 7-minute floor keeps 1-minute data from flapping on every hiccup.
pub fn tolerance_minutes(timeframe: Timeframe) -> i64 {
    i64::from(2 * timeframe.minutes()).max(7)
}

/// How the validator left the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessOutcome {
    /// Non-trading day: staleness is not meaningful, series accepted as-is.
    NotApplicable,
    /// Last bar within tolerance of the expected end.
    Fresh,
    /// Was stale, repaired by refetching the recent window.
    Refreshed,
    /// Still stale after the refetch; kept anyway (require_fresh off).
    StaleKept,
    /// Still stale after the refetch; discarded (require_fresh on).
    StaleDiscarded,
}

pub struct FreshnessValidator<'a> {
    calendar: &'a TradingCalendar,
    refetch_source: &'a dyn BarSource,
    require_fresh: bool,
}

impl<'a> FreshnessValidator<'a> {
    pub fn new(
        calendar: &'a TradingCalendar,
        refetch_source: &'a dyn BarSource,
        require_fresh: bool,
    ) -> Self {
        Self {
            calendar,
            refetch_source,
            require_fresh,
        }
    }

    /// Validate and, if needed, repair `bars` as of `now`.
    ///
    /// Future-stamped bars are always dropped first. Returns the series
    /// (possibly repaired, possibly empty) plus what happened to it.
    pub fn validate(
        &self,
        symbol: &SymbolCode,
        timeframe: Timeframe,
        mut bars: Vec<Bar>,
        limit: usize,
        now: NaiveDateTime,
    ) -> (Vec<Bar>, FreshnessOutcome) {
        if !self.calendar.is_trading_day(now.date()) {
            return (bars, FreshnessOutcome::NotApplicable);
        }

        trim_future(&mut bars, now);
        let expected_end = self.calendar.last_completed_bar_end(now, timeframe);
        if is_fresh(&bars, expected_end, timeframe) {
            return (bars, FreshnessOutcome::Fresh);
        }

        let last_seen = bars.last().map(|b| b.timestamp);
        debug!(
            symbol = %symbol,
            ?last_seen,
            %expected_end,
            "series stale, refetching recent window"
        );
        let start = now.date() - Duration::days(REFETCH_WINDOW_DAYS);
        let recent = self
            .refetch_source
            .fetch_or_empty(symbol, timeframe, start, now.date());
        let refetched = recent.len();
        let mut repaired = merge(bars, recent, limit);
        trim_future(&mut repaired, now);

        if is_fresh(&repaired, expected_end, timeframe) {
            info!(symbol = %symbol, refetched, "stale series repaired");
            return (repaired, FreshnessOutcome::Refreshed);
        }

        if self.require_fresh {
            warn!(
                symbol = %symbol,
                %expected_end,
                "series still stale after refetch, discarding"
            );
            (Vec::new(), FreshnessOutcome::StaleDiscarded)
        } else {
            warn!(
                symbol = %symbol,
                %expected_end,
                "series still stale after refetch, keeping best effort"
            );
            (repaired, FreshnessOutcome::StaleKept)
        }
    }
}

/// Drop bars stamped after `now`. Upstreams occasionally emit the bar
/// currently forming with its future end time.
fn trim_future(bars: &mut Vec<Bar>, now: NaiveDateTime) {
    let before = bars.len();
    bars.retain(|b| b.timestamp <= now);
    if bars.len() < before {
        debug!(dropped = before - bars.len(), "dropped future-stamped bars");
    }
}

fn is_fresh(bars: &[Bar], expected_end: NaiveDateTime, timeframe: Timeframe) -> bool {
    match bars.last() {
        Some(last) => (expected_end - last.timestamp).num_minutes() <= tolerance_minutes(timeframe),
        None => false,
    }
}
