//! Ordered provider fallback.
//!
//! Providers are tried in construction order. Unconfigured providers
//! are skipped without an HTTP call; any terminal failure (fatal,
//! quota, retries exhausted) records the reason and falls through to
//! the next provider. When every provider has failed the chain still
//! returns something publishable: a short Markdown failure report
//! carrying the last error, so the batch keeps moving.

use tracing::{debug, info, warn};

use super::{NarrativeError, NarrativeProvider, NarrativeRequest};

/// Narrative text plus where it came from. `provider` is `None` when
/// the text is the fallback failure report rather than real analysis.
#[derive(Debug, Clone)]
pub struct NarrativeOutput {
    pub text: String,
    pub provider: Option<String>,
}

impl NarrativeOutput {
    pub fn is_fallback_report(&self) -> bool {
        self.provider.is_none()
    }
}

pub struct ProviderChain {
    providers: Vec<Box<dyn NarrativeProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn NarrativeProvider>>) -> Self {
        Self { providers }
    }

    /// Names of providers that would actually be tried.
    pub fn configured_names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .map(|p| p.name())
            .collect()
    }

    pub fn generate(&self, request: &NarrativeRequest) -> NarrativeOutput {
        let mut last_error: Option<(String, NarrativeError)> = None;

        for provider in &self.providers {
            if !provider.is_configured() {
                debug!(provider = provider.name(), "skipping unconfigured provider");
                continue;
            }

            info!(provider = provider.name(), "requesting narrative");
            match provider.generate(request) {
                Ok(text) => {
                    info!(provider = provider.name(), chars = text.len(), "narrative generated");
                    return NarrativeOutput {
                        text,
                        provider: Some(provider.name().to_string()),
                    };
                }
                Err(err) => {
                    warn!(provider = provider.name(), "provider failed: {err}");
                    last_error = Some((provider.name().to_string(), err));
                }
            }
        }

        NarrativeOutput {
            text: failure_report(last_error.as_ref()),
            provider: None,
        }
    }
}

fn failure_report(last_error: Option<&(String, NarrativeError)>) -> String {
    match last_error {
        Some((provider, err)) => format!(
            "# Analysis unavailable\n\n\
             Every configured narrative provider failed for this symbol.\n\n\
             Last error ({provider}): `{err}`\n"
        ),
        None => format!(
            "# Analysis unavailable\n\n\
             {}\n",
            NarrativeError::NoProviderConfigured
        ),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
