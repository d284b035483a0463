//! Eastmoney intraday kline source.
//!
//! Fetches minute-level OHLCV bars from the push2his kline endpoint.
//! Each kline arrives as one comma-joined string; field order on the wire
//! is time,open,close,high,low,volume,amount. Volume is reported in lots
//! of 100 shares and passed through unscaled; unit reconciliation happens
//! before merging.
//!
//! The endpoint is unofficial and throttles aggressive polling, so every
//! request is preceded by a short randomized pause and connection-level
//! failures retry with a growing backoff.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use serde::Deserialize;

use super::normalize::{clean, RawRow};
use super::source::{BarSource, SourceError};
use crate::domain::{Bar, SymbolCode, Timeframe};

const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";

/// push2his kline payload. `data` is null for unknown symbols and empty
/// ranges.
#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Option<Vec<String>>,
}

pub struct EastmoneyIntradaySource {
    client: reqwest::blocking::Client,
    max_retries: u32,
}

impl EastmoneyIntradaySource {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            max_retries: 3,
        }
    }

    /// Exchange-qualified security id: market 1 (Shanghai) for codes
    /// starting 5, 6 or 9, market 0 (Shenzhen) otherwise.
    fn secid(symbol: &SymbolCode) -> String {
        let market = match symbol.as_str().as_bytes().first() {
            Some(b'5') | Some(b'6') | Some(b'9') => 1,
            _ => 0,
        };
        format!("{market}.{symbol}")
    }

    fn kline_url(
        symbol: &SymbolCode,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> String {
        format!(
            "{KLINE_URL}?fields1=f1,f2,f3,f4,f5,f6\
             &fields2=f51,f52,f53,f54,f55,f56,f57\
             &ut=7eea3edcaed734bea9cbfc24409ed989\
             &klt={klt}&fqt=1&secid={secid}&beg={beg}&end={end}",
            klt = timeframe.minutes(),
            secid = Self::secid(symbol),
            beg = start.format("%Y%m%d"),
            end = end.format("%Y%m%d"),
        )
    }

    /// Split one kline string into a raw row. Unparseable fields become
    /// None and the cleaning pass decides whether the row survives.
    fn parse_kline(line: &str) -> RawRow {
        let mut fields = line.split(',');
        let timestamp = fields.next().and_then(|s| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .ok()
        });
        let mut num = || fields.next().and_then(|s| s.parse::<f64>().ok());
        let open = num();
        let close = num();
        let high = num();
        let low = num();
        let volume = num();

        RawRow {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn parse_response(resp: KlineResponse) -> Vec<RawRow> {
        resp.data
            .and_then(|d| d.klines)
            .map(|lines| lines.iter().map(|l| Self::parse_kline(l)).collect())
            .unwrap_or_default()
    }

    fn fetch_with_retry(
        &self,
        symbol: &SymbolCode,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, SourceError> {
        let url = Self::kline_url(symbol, timeframe, start, end);
        let mut rng = rand::thread_rng();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            let delay = if attempt == 0 {
                // Politeness pause before the first request of every call.
                Duration::from_secs_f64(rng.gen_range(1.0..3.0))
            } else {
                Duration::from_secs_f64(f64::from(attempt) * 5.0 + rng.gen_range(0.0..1.0))
            };
            std::thread::sleep(delay);

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        return Err(SourceError::RateLimited(format!("HTTP 429 for {symbol}")));
                    }

                    if !status.is_success() {
                        return Err(SourceError::Other(format!("HTTP {status} for {symbol}")));
                    }

                    let parsed: KlineResponse = resp.json().map_err(|e| {
                        SourceError::ResponseFormatChanged(format!(
                            "failed to parse kline response for {symbol}: {e}"
                        ))
                    })?;

                    return Ok(clean(Self::parse_response(parsed)));
                }
                Err(e) => {
                    // Only connection-level failures are worth retrying.
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(SourceError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into())))
    }
}

impl Default for EastmoneyIntradaySource {
    fn default() -> Self {
        Self::new()
    }
}

impl BarSource for EastmoneyIntradaySource {
    fn name(&self) -> &str {
        "eastmoney_intraday"
    }

    fn fetch(
        &self,
        symbol: &SymbolCode,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, SourceError> {
        self.fetch_with_retry(symbol, timeframe, start, end)
    }
}
