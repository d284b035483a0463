//! Retry driver shared by all narrative providers, plus the small
//! parsers for server-suggested waits and quota phrases.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::outcome::AttemptOutcome;
use super::NarrativeError;

/// Case-insensitive markers that make a 429 body mean "daily/project
/// quota gone" rather than a short rate window. Waiting cannot help.
const QUOTA_PHRASES: [&str; 2] = ["quota", "resource_exhausted"];

/// Case-insensitive markers preceding a server-suggested wait in an
/// error body ("retry in 12.3s" prose, or a retryDelay field).
const RETRY_HINT_MARKERS: [&str; 2] = ["retry in", "retrydelay"];

/// Whether a 429 body signals a hard quota, not a rate window.
pub fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_lowercase();
    QUOTA_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Server-suggested wait: the `retry-after` header when it parses,
/// otherwise the first duration after a hint marker in the body
/// ("Please retry in 12.3s", `"retryDelay": "7s"`).
pub fn parse_retry_hint(retry_after: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(secs) = retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let lower = body.to_lowercase();
    for marker in RETRY_HINT_MARKERS {
        let Some(at) = lower.find(marker) else {
            continue;
        };
        if let Some(secs) = leading_seconds(&lower[at + marker.len()..]) {
            return Some(Duration::from_secs_f64(secs));
        }
    }
    None
}

/// First decimal number within a few characters of the start of `text`.
/// The bound keeps a digit elsewhere in the body from masquerading as a
/// wait suggestion.
fn leading_seconds(text: &str) -> Option<f64> {
    let start = text
        .char_indices()
        .take(16)
        .find(|(_, c)| c.is_ascii_digit())?
        .0;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok().filter(|s: &f64| s.is_finite() && *s >= 0.0)
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Exponential wait for `attempt` (1-based) plus up to a second of
    /// jitter. Used when the server did not suggest its own wait.
    pub fn backoff_wait(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1));
        exp + Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0))
    }
}

/// Drive `attempt_fn` under the policy.
///
/// Retryable outcomes sleep their suggested wait before the next
/// attempt; fatal and quota outcomes return immediately with no sleep,
/// and no sleep follows the final attempt.
pub fn run_with_retry<F>(policy: &RetryPolicy, mut attempt_fn: F) -> Result<String, NarrativeError>
where
    F: FnMut(u32) -> AttemptOutcome,
{
    let mut last_reason = "no attempts made".to_string();

    for attempt in 1..=policy.max_attempts {
        match attempt_fn(attempt) {
            AttemptOutcome::Success(text) => return Ok(text),
            AttemptOutcome::Fatal(reason) => return Err(NarrativeError::Fatal(reason)),
            AttemptOutcome::QuotaExhausted(reason) => {
                return Err(NarrativeError::QuotaExhausted(reason))
            }
            AttemptOutcome::Retryable { wait, reason } => {
                warn!(attempt, max = policy.max_attempts, "attempt failed: {reason}");
                last_reason = reason;
                if attempt < policy.max_attempts {
                    debug!(wait_secs = wait.as_secs_f64(), "backing off before retry");
                    std::thread::sleep(wait);
                }
            }
        }
    }

    Err(NarrativeError::RetriesExhausted(last_reason))
}
