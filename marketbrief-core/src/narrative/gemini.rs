//! Gemini narrative provider over the generateContent REST endpoint.
//!
//! Response handling is a pure step function over the observable parts
//! of one HTTP exchange (status, retry-after header, body text), driven
//! by the shared retry loop. The rules, in order:
//!
//! * 200 with extractable text -> success
//! * 400 -> fatal (the request itself is malformed)
//! * 429 with a quota phrase in the body -> quota exhausted, no sleep
//! * 429 otherwise -> retry after the server-suggested wait, falling
//!   back to exponential backoff when no hint parses
//! * 503 and everything else -> retry with exponential backoff

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::outcome::AttemptOutcome;
use super::retry::{is_quota_exhausted, parse_retry_hint, run_with_retry, RetryPolicy};
use super::{summarize_body, NarrativeError, NarrativeProvider, NarrativeRequest};

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    system_instruction: Content<'a>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

/// generateContent success payload. Everything is optional on the wire;
/// a response without text is treated like any other bad body.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiProvider {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
    model: String,
    policy: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            policy,
        }
    }

    fn attempt(&self, url: &str, payload: &GenerateRequest<'_>, attempt: u32) -> AttemptOutcome {
        let resp = match self.client.post(url).json(payload).send() {
            Ok(resp) => resp,
            Err(err) => {
                return AttemptOutcome::Retryable {
                    wait: self.policy.backoff_wait(attempt),
                    reason: format!("transport error: {err}"),
                }
            }
        };

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp.text().unwrap_or_default();

        classify(status, retry_after.as_deref(), &body, attempt, &self.policy)
    }
}

impl NarrativeProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        let Some(key) = &self.api_key else {
            return Err(NarrativeError::NotConfigured(self.name().to_string()));
        };

        let url = format!("{GENERATE_URL}/{model}:generateContent?key={key}", model = self.model);
        let payload = GenerateRequest {
            contents: [Content {
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: Content {
                parts: [Part {
                    text: &request.system,
                }],
            },
            generation_config: GenerationConfig { temperature: 0.2 },
        };

        debug!(model = %self.model, "calling gemini generateContent");
        run_with_retry(&self.policy, |attempt| self.attempt(&url, &payload, attempt))
    }
}

/// Decide what one generateContent exchange means.
pub fn classify(
    status: u16,
    retry_after: Option<&str>,
    body: &str,
    attempt: u32,
    policy: &RetryPolicy,
) -> AttemptOutcome {
    match status {
        200 => match extract_text(body) {
            Some(text) => AttemptOutcome::Success(text),
            None => AttemptOutcome::Retryable {
                wait: policy.backoff_wait(attempt),
                reason: format!("200 without candidate text: {}", summarize_body(body)),
            },
        },
        400 => AttemptOutcome::Fatal(format!("HTTP 400: {}", summarize_body(body))),
        429 if is_quota_exhausted(body) => {
            AttemptOutcome::QuotaExhausted(format!("HTTP 429: {}", summarize_body(body)))
        }
        429 => {
            let wait =
                parse_retry_hint(retry_after, body).unwrap_or_else(|| policy.backoff_wait(attempt));
            AttemptOutcome::Retryable {
                wait,
                reason: format!("HTTP 429: {}", summarize_body(body)),
            }
        }
        503 => AttemptOutcome::Retryable {
            wait: policy.backoff_wait(attempt),
            reason: format!("HTTP 503: {}", summarize_body(body)),
        },
        other => AttemptOutcome::Retryable {
            wait: policy.backoff_wait(attempt),
            reason: format!("HTTP {other}: {}", summarize_body(body)),
        },
    }
}

/// First candidate text, if the body is a well-formed generateContent
/// response that carries one.
fn extract_text(body: &str) -> Option<String> {
    let resp: GenerateResponse = serde_json::from_str(body).ok()?;
    resp.candidates?
        .into_iter()
        .next()?
        .content?
        .parts?
        .into_iter()
        .find_map(|part| part.text.filter(|text| !text.trim().is_empty()))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(2))
    }

    const OK_BODY: &str = r###"{
        "candidates": [
            {"content": {"parts": [{"text": "## Trend\nAccumulating."}]}}
        ]
    }"###;

    #[test]
    fn ok_body_is_success() {
        let outcome = classify(200, None, OK_BODY, 1, &policy());
        assert_eq!(
            outcome,
            AttemptOutcome::Success("## Trend\nAccumulating.".to_string())
        );
    }

    #[test]
    fn ok_without_text_retries() {
        let outcome = classify(200, None, r#"{"candidates": []}"#, 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::Retryable { .. }));
    }

    #[test]
    fn bad_request_is_fatal() {
        let outcome = classify(400, None, r#"{"error": {"message": "bad schema"}}"#, 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::Fatal(_)));
    }

    #[test]
    fn quota_429_exhausts_without_wait() {
        let body = r#"{"error": {"status": "RESOURCE_EXHAUSTED", "message": "quota exceeded"}}"#;
        let outcome = classify(429, Some("60"), body, 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::QuotaExhausted(_)));
    }

    #[test]
    fn rate_429_honors_header_hint() {
        let outcome = classify(429, Some("15"), "slow down", 1, &policy());
        match outcome {
            AttemptOutcome::Retryable { wait, .. } => assert_eq!(wait, Duration::from_secs(15)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rate_429_honors_body_hint() {
        let outcome = classify(429, None, "Please retry in 9.5s.", 2, &policy());
        match outcome {
            AttemptOutcome::Retryable { wait, .. } => {
                assert_eq!(wait, Duration::from_secs_f64(9.5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rate_429_without_hint_backs_off() {
        let outcome = classify(429, None, "slow down", 2, &policy());
        match outcome {
            // Attempt 2 backoff is 4s plus under a second of jitter.
            AttemptOutcome::Retryable { wait, .. } => {
                assert!(wait >= Duration::from_secs(4) && wait < Duration::from_secs(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn overloaded_503_retries() {
        let outcome = classify(503, None, "model overloaded", 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::Retryable { .. }));
    }

    #[test]
    fn unexpected_status_retries() {
        let outcome = classify(500, None, "internal", 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::Retryable { .. }));
    }

    #[test]
    fn extract_skips_empty_parts() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "  "}]}}
            ]
        }"#;
        assert_eq!(extract_text(body), None);
    }

    #[test]
    fn blank_key_counts_as_unconfigured() {
        let p = GeminiProvider::new(
            Some("  ".to_string()),
            "gemini-3-flash-preview",
            policy(),
            Duration::from_secs(5),
        );
        assert!(!p.is_configured());

        let configured = GeminiProvider::new(
            Some("k".to_string()),
            "gemini-3-flash-preview",
            policy(),
            Duration::from_secs(5),
        );
        assert!(configured.is_configured());
    }

    #[test]
    fn request_serializes_to_wire_shape() {
        let payload = GenerateRequest {
            contents: [Content {
                parts: [Part { text: "analyze" }],
            }],
            system_instruction: Content {
                parts: [Part { text: "persona" }],
            },
            generation_config: GenerationConfig { temperature: 0.2 },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "analyze");
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "persona");
        assert_eq!(json["generationConfig"]["temperature"], 0.2);
    }
}
