//! Session-authenticated historical bar gateway.
//!
//! Optional second source, enabled by configuration when a gateway base
//! URL is present. The gateway speaks a login/query/logout protocol;
//! every response carries an `error_code` envelope and a fetch is one
//! full session. Serves 5-minute and coarser bars only, volume in shares.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::warn;

use super::normalize::{clean, RawRow};
use super::source::{BarSource, SourceError};
use crate::domain::{Bar, SymbolCode, Timeframe};

const FIELDS: &str = "date,time,open,high,low,close,volume";

/// Every gateway endpoint answers with this envelope; `records` is only
/// populated by queries.
#[derive(Debug, Deserialize)]
struct GatewayEnvelope {
    error_code: String,
    #[serde(default)]
    error_msg: String,
    #[serde(default)]
    records: Vec<Vec<String>>,
}

pub struct SessionHistoricalSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl SessionHistoricalSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Exchange-prefixed code: sh. for Shanghai listings (codes starting
    /// 5, 6 or 9), sz. otherwise.
    fn exchange_code(symbol: &SymbolCode) -> String {
        let prefix = match symbol.as_str().as_bytes().first() {
            Some(b'5') | Some(b'6') | Some(b'9') => "sh",
            _ => "sz",
        };
        format!("{prefix}.{symbol}")
    }

    /// Gateway timestamps are packed YYYYMMDDHHMMSSmmm; only the seconds
    /// prefix is meaningful here.
    fn parse_composite_timestamp(raw: &str) -> Option<NaiveDateTime> {
        let prefix = raw.get(..14)?;
        NaiveDateTime::parse_from_str(prefix, "%Y%m%d%H%M%S").ok()
    }

    /// One record in FIELDS order, every value a string.
    fn parse_record(record: &[String]) -> RawRow {
        let num = |i: usize| record.get(i).and_then(|s| s.parse::<f64>().ok());
        RawRow {
            timestamp: record
                .get(1)
                .and_then(|s| Self::parse_composite_timestamp(s)),
            open: num(2),
            high: num(3),
            low: num(4),
            close: num(5),
            volume: num(6),
        }
    }

    fn call(&self, path: &str, params: &[(&str, String)]) -> Result<GatewayEnvelope, SourceError> {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .map_err(|e| SourceError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Other(format!("HTTP {status} from gateway {path}")));
        }

        resp.json()
            .map_err(|e| SourceError::ResponseFormatChanged(format!("gateway {path} payload: {e}")))
    }

    fn login(&self) -> Result<(), SourceError> {
        let envelope = self.call("login", &[])?;
        if envelope.error_code != "0" {
            return Err(SourceError::AuthenticationFailed(envelope.error_msg));
        }
        Ok(())
    }

    /// Logout failure leaves a dangling server-side session but the data
    /// is already in hand, so it is logged and swallowed.
    fn logout(&self) {
        match self.call("logout", &[]) {
            Ok(envelope) if envelope.error_code == "0" => {}
            Ok(envelope) => warn!(error = %envelope.error_msg, "gateway logout rejected"),
            Err(e) => warn!("gateway logout failed: {e}"),
        }
    }

    fn query(
        &self,
        symbol: &SymbolCode,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRow>, SourceError> {
        let params = [
            ("code", Self::exchange_code(symbol)),
            ("fields", FIELDS.to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("frequency", timeframe.minutes().to_string()),
            ("adjustflag", "3".to_string()),
        ];
        let envelope = self.call("query_history_k_data", &params)?;
        if envelope.error_code != "0" {
            return Err(SourceError::Other(format!(
                "gateway query failed: {}",
                envelope.error_msg
            )));
        }
        Ok(envelope
            .records
            .iter()
            .map(|r| Self::parse_record(r))
            .collect())
    }
}

impl BarSource for SessionHistoricalSource {
    fn name(&self) -> &str {
        "historical_gateway"
    }

    fn fetch(
        &self,
        symbol: &SymbolCode,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, SourceError> {
        if timeframe == Timeframe::M1 {
            return Err(SourceError::UnsupportedTimeframe(timeframe));
        }

        self.login()?;
        let rows = self.query(symbol, timeframe, start, end);
        self.logout();
        Ok(clean(rows?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sym(code: &str) -> SymbolCode {
        SymbolCode::parse(code).unwrap()
    }

    #[test]
    fn exchange_codes() {
        assert_eq!(
            SessionHistoricalSource::exchange_code(&sym("600970")),
            "sh.600970"
        );
        assert_eq!(
            SessionHistoricalSource::exchange_code(&sym("000001")),
            "sz.000001"
        );
        assert_eq!(
            SessionHistoricalSource::exchange_code(&sym("900901")),
            "sh.900901"
        );
    }

    #[test]
    fn composite_timestamp_drops_millisecond_suffix() {
        let ts = SessionHistoricalSource::parse_composite_timestamp("20250825093500000");
        assert_eq!(
            ts,
            Some(
                NaiveDate::from_ymd_opt(2025, 8, 25)
                    .unwrap()
                    .and_hms_opt(9, 35, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn bare_fourteen_digit_timestamp_parses() {
        assert!(SessionHistoricalSource::parse_composite_timestamp("20250825093500").is_some());
    }

    #[test]
    fn short_or_garbled_timestamp_is_rejected() {
        assert!(SessionHistoricalSource::parse_composite_timestamp("2025-08-25").is_none());
        assert!(SessionHistoricalSource::parse_composite_timestamp("20250825").is_none());
        assert!(SessionHistoricalSource::parse_composite_timestamp("abcdefghijklmn000").is_none());
    }

    #[test]
    fn record_in_fields_order() {
        let record: Vec<String> = [
            "2025-08-25",
            "20250825093500000",
            "10.00",
            "10.10",
            "9.95",
            "10.05",
            "50000",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let row = SessionHistoricalSource::parse_record(&record);
        assert_eq!(row.open, Some(10.0));
        assert_eq!(row.high, Some(10.10));
        assert_eq!(row.low, Some(9.95));
        assert_eq!(row.close, Some(10.05));
        assert_eq!(row.volume, Some(50_000.0));
    }

    #[test]
    fn truncated_record_yields_missing_fields() {
        let record: Vec<String> = ["2025-08-25", "20250825093500000", "10.00"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = SessionHistoricalSource::parse_record(&record);
        assert_eq!(row.open, Some(10.0));
        assert_eq!(row.close, None);
        assert!(clean(vec![row]).is_empty());
    }

    #[test]
    fn envelope_without_records_deserializes() {
        let envelope: GatewayEnvelope =
            serde_json::from_value(json!({ "error_code": "0", "error_msg": "success" })).unwrap();
        assert_eq!(envelope.error_code, "0");
        assert!(envelope.records.is_empty());
    }

    #[test]
    fn one_minute_bars_are_refused_before_any_session() {
        let source = SessionHistoricalSource::new("http://127.0.0.1:1");
        let day = NaiveDate::from_ymd_opt(2025, 8, 25).unwrap();
        let err = source.fetch(&sym("600970"), Timeframe::M1, day, day).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedTimeframe(Timeframe::M1)));
    }
}
