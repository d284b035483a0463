//! Upstream trading-date feed.
//!
//! The production feed is an akshare-compatible HTTP front (AKTools-style)
//! for the Sina trade-date helper: a parameterless GET returning a JSON
//! array, either of objects carrying a `trade_date` field or of bare date
//! strings. Date formats vary across providers (`YYYYMMDD`, `YYYY-MM-DD`,
//! sometimes with a time suffix), so everything funnels through
//! [`normalize_date`].

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;

use super::CalendarError;

/// Feed seam; the HTTP implementation is swapped for a fake in tests.
pub trait CalendarFeed {
    fn name(&self) -> &str;

    /// Trading dates in provider-native string format.
    fn fetch_dates(&self) -> Result<Vec<String>, CalendarError>;
}

/// Normalize a provider-native date string to a `NaiveDate`.
///
/// Accepts `YYYY-MM-DD` (a trailing time suffix is ignored) and `YYYYMMDD`.
pub fn normalize_date(raw: &str) -> Result<NaiveDate, CalendarError> {
    let trimmed = raw.trim();
    if trimmed.contains('-') {
        let head = if trimmed.len() >= 10 { &trimmed[..10] } else { trimmed };
        return NaiveDate::parse_from_str(head, "%Y-%m-%d")
            .map_err(|_| CalendarError::DateFormat(raw.to_string()));
    }
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(trimmed, "%Y%m%d")
            .map_err(|_| CalendarError::DateFormat(raw.to_string()));
    }
    Err(CalendarError::DateFormat(raw.to_string()))
}

/// HTTP feed for the Sina trade-date list.
pub struct SinaCalendarFeed {
    client: reqwest::blocking::Client,
    url: String,
}

impl SinaCalendarFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            url: url.into(),
        }
    }

    /// Pull date strings out of the response body.
    fn extract_dates(body: &Value) -> Vec<String> {
        let Some(rows) = body.as_array() else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| match row {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map
                    .get("trade_date")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

impl CalendarFeed for SinaCalendarFeed {
    fn name(&self) -> &str {
        "sina_trade_dates"
    }

    fn fetch_dates(&self) -> Result<Vec<String>, CalendarError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| CalendarError::Feed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CalendarError::Feed(format!("HTTP {status}")));
        }

        let body: Value = resp
            .json()
            .map_err(|e| CalendarError::Feed(format!("bad calendar payload: {e}")))?;

        Ok(Self::extract_dates(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_dashed() {
        assert_eq!(
            normalize_date("2025-08-25").unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 25).unwrap()
        );
    }

    #[test]
    fn normalize_dashed_with_time_suffix() {
        assert_eq!(
            normalize_date("2025-08-25T00:00:00.000").unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 25).unwrap()
        );
    }

    #[test]
    fn normalize_compact() {
        assert_eq!(
            normalize_date("20250825").unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 25).unwrap()
        );
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_date("garbage").is_err());
        assert!(normalize_date("2025/08/25").is_err());
        assert!(normalize_date("202508").is_err());
    }

    #[test]
    fn extract_from_object_rows() {
        let body = json!([
            {"trade_date": "2025-08-25"},
            {"trade_date": "2025-08-26"},
            {"other": 1}
        ]);
        let dates = SinaCalendarFeed::extract_dates(&body);
        assert_eq!(dates, vec!["2025-08-25", "2025-08-26"]);
    }

    #[test]
    fn extract_from_bare_strings() {
        let body = json!(["20250825", "20250826"]);
        let dates = SinaCalendarFeed::extract_dates(&body);
        assert_eq!(dates.len(), 2);
    }

    #[test]
    fn extract_from_non_array_is_empty() {
        let body = json!({"error": "nope"});
        assert!(SinaCalendarFeed::extract_dates(&body).is_empty());
    }
}
