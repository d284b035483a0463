//! Security identifier newtype.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A 6-digit exchange security code (e.g. `600970`).
///
/// Construction is forgiving about the surrounding text: watch-list rows
/// arrive as `sh600970`, `600970.SH`, or a spreadsheet cell that lost its
/// leading zeros. We extract the digits and left-pad to 6.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SymbolCode(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolCodeError {
    #[error("no digits in symbol input '{0}'")]
    NoDigits(String),
    #[error("too many digits in symbol input '{0}' (expected at most 6)")]
    TooManyDigits(String),
}

impl SymbolCode {
    /// Extract the digit characters from `input` and zero-pad to 6.
    pub fn parse(input: &str) -> Result<Self, SymbolCodeError> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(SymbolCodeError::NoDigits(input.to_string()));
        }
        if digits.len() > 6 {
            return Err(SymbolCodeError::TooManyDigits(input.to_string()));
        }
        Ok(Self(format!("{digits:0>6}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SymbolCode {
    type Error = SymbolCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SymbolCode> for String {
    fn from(code: SymbolCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_code() {
        assert_eq!(SymbolCode::parse("600970").unwrap().as_str(), "600970");
    }

    #[test]
    fn parse_strips_exchange_prefix() {
        assert_eq!(SymbolCode::parse("sh600970").unwrap().as_str(), "600970");
        assert_eq!(SymbolCode::parse("600970.SH").unwrap().as_str(), "600970");
    }

    #[test]
    fn parse_pads_lost_leading_zeros() {
        // Spreadsheets hand back "1" for code 000001.
        assert_eq!(SymbolCode::parse("1").unwrap().as_str(), "000001");
        assert_eq!(SymbolCode::parse("2594").unwrap().as_str(), "002594");
    }

    #[test]
    fn parse_rejects_no_digits() {
        assert_eq!(
            SymbolCode::parse("SPY"),
            Err(SymbolCodeError::NoDigits("SPY".into()))
        );
    }

    #[test]
    fn parse_rejects_too_many_digits() {
        assert!(matches!(
            SymbolCode::parse("12345678"),
            Err(SymbolCodeError::TooManyDigits(_))
        ));
    }

    #[test]
    fn serde_roundtrip_through_string() {
        let code = SymbolCode::parse("600970").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"600970\"");
        let back: SymbolCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }
}
