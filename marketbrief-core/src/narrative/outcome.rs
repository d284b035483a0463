//! Outcome of a single provider attempt.

use std::time::Duration;

/// What one HTTP attempt against a narrative provider produced.
///
/// Classification is separated from the HTTP call so the per-status
/// rules and the retry driver are testable without a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Narrative text extracted.
    Success(String),
    /// Transient failure; retry after waiting.
    Retryable { wait: Duration, reason: String },
    /// Permanent for this provider (bad key, malformed request).
    Fatal(String),
    /// The billing or free-tier quota is gone. Retrying cannot help and
    /// the chain must move to the next provider without sleeping.
    QuotaExhausted(String),
}
