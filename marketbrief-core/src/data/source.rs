//! Bar source trait and structured error types.
//!
//! The BarSource trait abstracts over upstream bar providers (Eastmoney
//! intraday, the historical gateway) so the pipeline can swap
//! implementations and mock for tests.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::domain::{Bar, SymbolCode, Timeframe};

/// Structured error types for bar fetching.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("timeframe {0} not supported by this source")]
    UnsupportedTimeframe(Timeframe),

    #[error("source error: {0}")]
    Other(String),
}

/// Trait for bar providers.
///
/// `fetch` reports failures as errors for callers that care (tests, the
/// CLI); the pipeline goes through `fetch_or_empty`, which absorbs the
/// failure into an empty series. A partial-source outage must never abort
/// a whole symbol.
pub trait BarSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch OHLCV bars for a symbol/timeframe over a date range,
    /// normalized to the canonical schema and sorted ascending.
    fn fetch(
        &self,
        symbol: &SymbolCode,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, SourceError>;

    /// Absorbing wrapper: failures are logged and become an empty series.
    fn fetch_or_empty(
        &self,
        symbol: &SymbolCode,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<Bar> {
        match self.fetch(symbol, timeframe, start, end) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(
                    source = self.name(),
                    symbol = %symbol,
                    "fetch failed, continuing with empty series: {e}"
                );
                Vec::new()
            }
        }
    }
}
