//! Narrative generation: prompt templating and the provider chain.
//!
//! Three providers are tried in a fixed order (Gemini, then two
//! OpenAI-compatible endpoints); each runs its own retry loop and the
//! chain falls through to the next on any failure. Quota exhaustion
//! falls through immediately without sleeping.

pub mod chain;
pub mod chat;
pub mod gemini;
pub mod outcome;
pub mod prompt;
pub mod retry;

pub use chain::{NarrativeOutput, ProviderChain};
pub use chat::ChatCompletionsProvider;
pub use gemini::GeminiProvider;
pub use outcome::AttemptOutcome;
pub use prompt::{position_context, series_csv, PromptContext, PromptTemplate, SYSTEM_INSTRUCTION};
pub use retry::{run_with_retry, RetryPolicy};

use thiserror::Error;

/// Terminal failure of one provider, or of the whole chain.
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("no narrative provider is configured")]
    NoProviderConfigured,

    #[error("provider {0} has no API key")]
    NotConfigured(String),

    #[error("provider rejected the request: {0}")]
    Fatal(String),

    #[error("provider quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("retries exhausted: {0}")]
    RetriesExhausted(String),
}

/// What every provider receives: a fixed analyst persona plus the
/// rendered per-symbol prompt.
#[derive(Debug, Clone)]
pub struct NarrativeRequest {
    pub system: String,
    pub prompt: String,
}

pub trait NarrativeProvider {
    fn name(&self) -> &str;

    /// A provider without credentials is skipped by the chain, no HTTP
    /// is attempted.
    fn is_configured(&self) -> bool;

    fn generate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError>;
}

/// First line of an error body, truncated, for logs and error text.
pub(crate) fn summarize_body(body: &str) -> String {
    let line = body.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "(empty body)".to_string();
    }
    let mut summary: String = line.chars().take(200).collect();
    if line.chars().count() > 200 {
        summary.push_str("...");
    }
    summary
}
