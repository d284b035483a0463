//! Trading calendar: trading-day membership and session math.
//!
//! The calendar is loaded once per process run: from the CSV cache when it
//! is younger than [`CACHE_MAX_AGE_DAYS`], otherwise refetched from the
//! upstream feed. A feed failure with no usable cache yields an empty date
//! set, which [`TradingCalendar::is_trading_day`] interprets as "apply the
//! Mon-Fri weekday heuristic" (policy-gated, it can misfire on holidays).
//!
//! Session math is pure: no IO, no wall clock. `now` is always a parameter.

pub mod feed;
pub mod store;

pub use feed::{normalize_date, CalendarFeed, SinaCalendarFeed};
pub use store::{CalendarStore, CsvCalendarStore, StoredCalendar};

use std::collections::BTreeSet;
use std::time::Duration as StdDuration;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::Timeframe;

/// Cache copies older than this are refetched even when they parse.
pub const CACHE_MAX_AGE_DAYS: u64 = 7;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar feed error: {0}")]
    Feed(String),

    #[error("calendar cache error: {0}")]
    Store(String),

    #[error("unrecognized date format: '{0}'")]
    DateFormat(String),
}

/// Mainland session boundaries (exchange-local naive time).
fn session_time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// Set of trading dates plus the degraded-fallback policy.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    days: BTreeSet<NaiveDate>,
    weekday_fallback: bool,
}

impl TradingCalendar {
    pub fn new(days: BTreeSet<NaiveDate>, weekday_fallback: bool) -> Self {
        Self {
            days,
            weekday_fallback,
        }
    }

    /// Load the calendar through the store/feed pair.
    ///
    /// Never fails: every degraded path is logged and ends in a usable
    /// (possibly empty) calendar.
    pub fn load(
        store: &dyn CalendarStore,
        feed: &dyn CalendarFeed,
        weekday_fallback: bool,
    ) -> Self {
        let max_age = StdDuration::from_secs(CACHE_MAX_AGE_DAYS * 24 * 3600);

        let stored = match store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("calendar cache unreadable: {e}");
                None
            }
        };

        if let Some(cached) = &stored {
            if cached.age <= max_age {
                return Self::new(cached.dates.clone(), weekday_fallback);
            }
        }

        match fetch_and_normalize(feed) {
            Ok(dates) => {
                if let Err(e) = store.save(&dates) {
                    warn!("calendar cache write failed: {e}");
                }
                info!(days = dates.len(), "trading calendar refreshed from feed");
                Self::new(dates, weekday_fallback)
            }
            Err(e) => match stored {
                // Stale beats empty when the feed is down.
                Some(cached) => {
                    warn!("calendar feed failed ({e}); using stale cache");
                    Self::new(cached.dates, weekday_fallback)
                }
                None => {
                    warn!("calendar feed failed with no cache ({e}); weekday heuristic applies");
                    Self::new(BTreeSet::new(), weekday_fallback)
                }
            },
        }
    }

    /// Force a feed fetch regardless of cache age, rewriting the cache.
    pub fn refresh(
        store: &dyn CalendarStore,
        feed: &dyn CalendarFeed,
        weekday_fallback: bool,
    ) -> Result<Self, CalendarError> {
        let dates = fetch_and_normalize(feed)?;
        if let Err(e) = store.save(&dates) {
            warn!("calendar cache write failed: {e}");
        }
        info!(days = dates.len(), "trading calendar refreshed from feed");
        Ok(Self::new(dates, weekday_fallback))
    }

    /// Whether the calendar holds any real trading dates (false means the
    /// weekday heuristic, or nothing, is in effect).
    pub fn is_degraded(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if self.days.is_empty() {
            return self.weekday_fallback
                && !matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        }
        self.days.contains(&date)
    }

    /// Most recent trading day strictly before `date`.
    ///
    /// Bounded scan; a calendar with no trading day in the past year
    /// degenerates to the previous calendar day.
    pub fn prev_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date - Duration::days(1);
        for _ in 0..366 {
            if self.is_trading_day(day) {
                return day;
            }
            day -= Duration::days(1);
        }
        date - Duration::days(1)
    }

    /// End timestamp of the last fully-closed bar of width `timeframe`.
    ///
    /// Bars are labeled by their END time (upstream kline convention).
    /// Sessions: 09:30-11:30 and 13:00-15:00. Outside a session the answer
    /// is the nearest preceding session close; a non-trading day reports
    /// its own 15:00.
    pub fn last_completed_bar_end(
        &self,
        now: NaiveDateTime,
        timeframe: Timeframe,
    ) -> NaiveDateTime {
        let day = now.date();
        let morning_open = session_time(9, 30);
        let morning_close = session_time(11, 30);
        let afternoon_open = session_time(13, 0);
        let afternoon_close = session_time(15, 0);

        if !self.is_trading_day(day) {
            return day.and_time(afternoon_close);
        }

        let t = now.time();
        if t < morning_open {
            return self.prev_trading_day(day).and_time(afternoon_close);
        }
        if t >= afternoon_close {
            return day.and_time(afternoon_close);
        }
        if t >= morning_close && t < afternoon_open {
            return day.and_time(morning_close);
        }

        let (open, prior_close) = if t < morning_close {
            (
                morning_open,
                self.prev_trading_day(day).and_time(afternoon_close),
            )
        } else {
            (afternoon_open, day.and_time(morning_close))
        };

        let elapsed = (t - open).num_minutes();
        let k = elapsed / timeframe.minutes() as i64;
        if k == 0 {
            // No bucket has closed yet in this session.
            prior_close
        } else {
            day.and_time(open) + Duration::minutes(k * timeframe.minutes() as i64)
        }
    }
}

fn fetch_and_normalize(feed: &dyn CalendarFeed) -> Result<BTreeSet<NaiveDate>, CalendarError> {
    let raw = feed.fetch_dates()?;
    let mut dates = BTreeSet::new();
    let mut malformed = 0usize;
    for value in &raw {
        match normalize_date(value) {
            Ok(date) => {
                dates.insert(date);
            }
            Err(_) => malformed += 1,
        }
    }
    if malformed > 0 {
        warn!(malformed, source = feed.name(), "skipped malformed calendar rows");
    }
    if dates.is_empty() {
        return Err(CalendarError::Feed(format!(
            "feed '{}' produced no parseable dates",
            feed.name()
        )));
    }
    Ok(dates)
}
