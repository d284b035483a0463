//! Environment-backed runtime configuration.
//!
//! Every knob is an environment variable with a default, read once at
//! startup through an injected lookup so tests never touch the process
//! environment. Absent keys take their default; a key that is present
//! but malformed is a startup error, never a silent fallback.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use marketbrief_core::narrative::RetryPolicy;

use crate::schedule::Slot;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Schedule gate settings.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// SCHEDULE_ENFORCED, default false: run on every invocation.
    pub enforced: bool,
    /// PUSH_SLOTS, default "1140,1520".
    pub slots: Vec<Slot>,
    /// SLOT_LAG_MINUTES, default 20.
    pub lag_minutes: i64,
}

/// Market data settings.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// BARS_COUNT, default 600: bar limit for plain watch-list entries.
    pub bars_count: usize,
    /// REQUIRE_FRESH, default true: discard irreparably stale series.
    pub require_fresh: bool,
    /// SYMBOL_COOLDOWN_SECS, default 30.
    pub symbol_cooldown_secs: u64,
    /// HIST_API_BASE; unset disables the historical gateway entirely.
    pub hist_api_base: Option<String>,
    /// CALENDAR_API_URL, default the local AKTools endpoint.
    pub calendar_api_url: String,
    /// CALENDAR_WEEKDAY_FALLBACK, default true.
    pub calendar_weekday_fallback: bool,
    /// RUN_STATE_RETENTION_DAYS, default 30.
    pub run_state_retention_days: i64,
    /// SYMBOLS, default "600970": last-resort watch-list.
    pub symbols_fallback: Vec<String>,
}

/// The Gemini endpoint; its URL is fixed by the wire format.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
}

impl GeminiConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// An OpenAI-compatible chat/completions endpoint (providers 2 and 3).
#[derive(Debug, Clone)]
pub struct ChatEndpointConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl ChatEndpointConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Narrative generation settings.
#[derive(Debug, Clone)]
pub struct NarrativeConfig {
    /// AI_RETRY_COUNT, default 3 attempts per provider.
    pub retry_count: u32,
    /// AI_BACKOFF_BASE_SECS, default 2.
    pub backoff_base_secs: u64,
    /// AI_TIMEOUT_SECS, default 60, per HTTP call.
    pub timeout_secs: u64,
    pub gemini: GeminiConfig,
    pub openai: ChatEndpointConfig,
    pub deepseek: ChatEndpointConfig,
    /// ANALYSIS_PROMPT_TEMPLATE: inline template, highest precedence.
    pub prompt_template: Option<String>,
}

impl NarrativeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_secs(self.backoff_base_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Artifact locations.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// DATA_DIR, default "data".
    pub data_dir: PathBuf,
    /// REPORTS_DIR, default "reports".
    pub reports_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub data: DataConfig,
    pub narrative: NarrativeConfig,
    pub paths: PathsConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let schedule = ScheduleConfig {
            enforced: parse_bool(&lookup, "SCHEDULE_ENFORCED", false)?,
            slots: parse_slots(&lookup, "PUSH_SLOTS", "1140,1520")?,
            lag_minutes: parse_int(&lookup, "SLOT_LAG_MINUTES", 20)?,
        };
        if schedule.enforced && schedule.slots.is_empty() {
            return Err(ConfigError::Invalid {
                key: "PUSH_SLOTS",
                value: String::new(),
                reason: "schedule enforcement needs at least one slot".into(),
            });
        }
        if schedule.lag_minutes < 0 {
            return Err(ConfigError::Invalid {
                key: "SLOT_LAG_MINUTES",
                value: schedule.lag_minutes.to_string(),
                reason: "must be non-negative".into(),
            });
        }

        let bars_count = parse_int::<usize, _>(&lookup, "BARS_COUNT", 600)?;
        if bars_count == 0 {
            return Err(ConfigError::Invalid {
                key: "BARS_COUNT",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let retention = parse_int::<i64, _>(&lookup, "RUN_STATE_RETENTION_DAYS", 30)?;
        if retention < 0 {
            return Err(ConfigError::Invalid {
                key: "RUN_STATE_RETENTION_DAYS",
                value: retention.to_string(),
                reason: "must be non-negative".into(),
            });
        }

        let data = DataConfig {
            bars_count,
            require_fresh: parse_bool(&lookup, "REQUIRE_FRESH", true)?,
            symbol_cooldown_secs: parse_int(&lookup, "SYMBOL_COOLDOWN_SECS", 30)?,
            hist_api_base: non_empty(&lookup, "HIST_API_BASE"),
            calendar_api_url: string_or(
                &lookup,
                "CALENDAR_API_URL",
                "http://127.0.0.1:8080/api/public/tool_trade_date_hist_sina",
            ),
            calendar_weekday_fallback: parse_bool(&lookup, "CALENDAR_WEEKDAY_FALLBACK", true)?,
            run_state_retention_days: retention,
            symbols_fallback: split_list(&string_or(&lookup, "SYMBOLS", "600970")),
        };

        let narrative = NarrativeConfig {
            retry_count: parse_int(&lookup, "AI_RETRY_COUNT", 3)?,
            backoff_base_secs: parse_int(&lookup, "AI_BACKOFF_BASE_SECS", 2)?,
            timeout_secs: parse_int(&lookup, "AI_TIMEOUT_SECS", 60)?,
            gemini: GeminiConfig {
                api_key: non_empty(&lookup, "GEMINI_API_KEY"),
                model: string_or(&lookup, "GEMINI_MODEL", "gemini-3-flash-preview"),
            },
            openai: ChatEndpointConfig {
                api_key: non_empty(&lookup, "OPENAI_API_KEY"),
                model: string_or(&lookup, "OPENAI_MODEL", "gpt-4o"),
                base_url: string_or(&lookup, "OPENAI_BASE_URL", "https://api.openai.com/v1"),
            },
            deepseek: ChatEndpointConfig {
                api_key: non_empty(&lookup, "DEEPSEEK_API_KEY"),
                model: string_or(&lookup, "DEEPSEEK_MODEL", "deepseek-chat"),
                base_url: string_or(&lookup, "DEEPSEEK_BASE_URL", "https://api.deepseek.com/v1"),
            },
            prompt_template: non_empty(&lookup, "ANALYSIS_PROMPT_TEMPLATE"),
        };

        let paths = PathsConfig {
            data_dir: PathBuf::from(string_or(&lookup, "DATA_DIR", "data")),
            reports_dir: PathBuf::from(string_or(&lookup, "REPORTS_DIR", "reports")),
        };

        Ok(Config {
            schedule,
            data,
            narrative,
            paths,
        })
    }
}

fn string_or<F>(lookup: &F, key: &'static str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key) {
        Some(value) => value,
        None => default.to_string(),
    }
}

fn non_empty<F>(lookup: &F, key: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected true/false".into(),
        }),
    }
}

fn parse_int<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(default);
    };
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw,
        reason: "expected an integer".into(),
    })
}

fn parse_slots<F>(lookup: &F, key: &'static str, default: &str) -> Result<Vec<Slot>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = string_or(lookup, key, default);
    let mut slots = Vec::new();
    for part in split_list(&raw) {
        let slot = Slot::parse(&part).map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })?;
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    Ok(slots)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────
