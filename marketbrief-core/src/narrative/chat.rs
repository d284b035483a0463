//! OpenAI-compatible chat/completions provider.
//!
//! One implementation serves every endpoint that speaks the
//! chat/completions dialect (OpenAI itself, DeepSeek, any proxy);
//! base URL, model and display name are constructor parameters.
//! Response policy is simpler than Gemini's: 400 and 401 are fatal,
//! a 429 carrying a quota phrase exhausts the provider, everything
//! else retries with exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::outcome::AttemptOutcome;
use super::retry::{is_quota_exhausted, parse_retry_hint, run_with_retry, RetryPolicy};
use super::{summarize_body, NarrativeError, NarrativeProvider, NarrativeRequest};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct ChatCompletionsProvider {
    client: reqwest::blocking::Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    policy: RetryPolicy,
}

impl ChatCompletionsProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
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
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            policy,
        }
    }

    fn attempt(&self, key: &str, payload: &ChatRequest<'_>, attempt: u32) -> AttemptOutcome {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = match self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(payload)
            .send()
        {
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

impl NarrativeProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        let Some(key) = &self.api_key else {
            return Err(NarrativeError::NotConfigured(self.name.clone()));
        };

        let payload = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.2,
        };

        debug!(provider = %self.name, model = %self.model, "calling chat/completions");
        run_with_retry(&self.policy, |attempt| self.attempt(key, &payload, attempt))
    }
}

/// Decide what one chat/completions exchange means.
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
                reason: format!("200 without choice content: {}", summarize_body(body)),
            },
        },
        400 | 401 => AttemptOutcome::Fatal(format!("HTTP {status}: {}", summarize_body(body))),
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
        other => AttemptOutcome::Retryable {
            wait: policy.backoff_wait(attempt),
            reason: format!("HTTP {other}: {}", summarize_body(body)),
        },
    }
}

fn extract_text(body: &str) -> Option<String> {
    let resp: ChatResponse = serde_json::from_str(body).ok()?;
    resp.choices?
        .into_iter()
        .next()?
        .message?
        .content
        .filter(|text| !text.trim().is_empty())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(2))
    }

    fn provider(key: Option<&str>) -> ChatCompletionsProvider {
        ChatCompletionsProvider::new(
            "deepseek",
            "https://api.deepseek.com/v1/",
            key.map(str::to_owned),
            "deepseek-chat",
            policy(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn ok_body_is_success() {
        let body = r###"{"choices": [{"message": {"role": "assistant", "content": "## Trend"}}]}"###;
        assert_eq!(
            classify(200, None, body, 1, &policy()),
            AttemptOutcome::Success("## Trend".to_string())
        );
    }

    #[test]
    fn ok_without_content_retries() {
        let outcome = classify(200, None, r#"{"choices": []}"#, 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::Retryable { .. }));
    }

    #[test]
    fn auth_failures_are_fatal() {
        for status in [400, 401] {
            let outcome = classify(status, None, "invalid key", 1, &policy());
            assert!(matches!(outcome, AttemptOutcome::Fatal(_)), "status {status}");
        }
    }

    #[test]
    fn quota_429_exhausts() {
        let body = r#"{"error": {"message": "You exceeded your current quota"}}"#;
        let outcome = classify(429, None, body, 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::QuotaExhausted(_)));
    }

    #[test]
    fn rate_429_retries_with_hint() {
        let outcome = classify(429, Some("8"), "slow down", 1, &policy());
        match outcome {
            AttemptOutcome::Retryable { wait, .. } => assert_eq!(wait, Duration::from_secs(8)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn server_error_retries() {
        let outcome = classify(502, None, "bad gateway", 1, &policy());
        assert!(matches!(outcome, AttemptOutcome::Retryable { .. }));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let p = provider(Some("k"));
        assert_eq!(p.base_url, "https://api.deepseek.com/v1");
    }

    #[test]
    fn missing_key_means_unconfigured() {
        assert!(!provider(None).is_configured());
        assert!(!provider(Some("")).is_configured());
        assert!(provider(Some("k")).is_configured());

        let err = provider(None).generate(&NarrativeRequest {
            system: "s".into(),
            prompt: "p".into(),
        });
        assert!(matches!(err, Err(NarrativeError::NotConfigured(_))));
    }
}
