//! Typed gateway configuration.
//!
//! All environment reads happen here, once, at startup. Numeric knobs are
//! clamped at construction so call sites never re-validate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Known upstream AI providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Parse a provider identifier; unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(Provider::Gemini),
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment. Controls whether error `details` are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Fixed-window rate limit policy for one endpoint class.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_count: u32,
}

impl RateLimitPolicy {
    /// Clamp to the sane floors: window >= 250ms, max >= 1.
    pub fn clamped(window: Duration, max_count: u32) -> Self {
        Self {
            window: window.max(MIN_WINDOW),
            max_count: max_count.max(1),
        }
    }
}

/// Default model identifier per vendor.
#[derive(Debug, Clone)]
pub struct VendorModels {
    pub gemini: String,
    pub openai: String,
    pub anthropic: String,
}

impl VendorModels {
    pub fn for_provider(&self, provider: Provider) -> &str {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
        }
    }
}

pub const MIN_WINDOW: Duration = Duration::from_millis(250);

const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_RATE_MAX: u32 = 20;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_ACCOUNTING_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_PROVIDER_CACHE_TTL: Duration = Duration::from_secs(60);

/// Environment variable consulted on every provider resolution.
/// Break-glass override: wins over the settings store, never cached.
pub const PROVIDER_OVERRIDE_VAR: &str = "MODELGATE_FORCE_PROVIDER";

/// Immutable gateway configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub default_provider: Provider,
    pub provider_override_var: String,
    pub provider_cache_ttl: Duration,
    pub models: VendorModels,
    pub max_body_bytes: usize,
    pub upstream_timeout: Duration,
    pub oracle_timeout: Duration,
    pub accounting_timeout: Duration,
    pub rate_limit: RateLimitPolicy,
}

impl GatewayConfig {
    /// Read configuration from the process environment. Never fails:
    /// invalid values fall back to defaults with a warning, numeric knobs
    /// are clamped to their floors.
    pub fn from_env() -> Self {
        let environment = match std::env::var("MODELGATE_ENV").ok().as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let default_provider = std::env::var("MODELGATE_DEFAULT_PROVIDER")
            .ok()
            .and_then(|s| {
                let parsed = Provider::parse(&s);
                if parsed.is_none() {
                    tracing::warn!("Invalid MODELGATE_DEFAULT_PROVIDER '{}', using gemini", s);
                }
                parsed
            })
            .unwrap_or(Provider::Gemini);

        let window = env_millis("MODELGATE_RATE_WINDOW_MS").unwrap_or(DEFAULT_RATE_WINDOW);
        let max_count = env_u32("MODELGATE_RATE_MAX").unwrap_or(DEFAULT_RATE_MAX);

        Self {
            environment,
            default_provider,
            provider_override_var: PROVIDER_OVERRIDE_VAR.to_string(),
            provider_cache_ttl: DEFAULT_PROVIDER_CACHE_TTL,
            models: VendorModels {
                gemini: env_or("MODELGATE_GEMINI_MODEL", "gemini-2.0-flash"),
                openai: env_or("MODELGATE_OPENAI_MODEL", "gpt-4o-mini"),
                anthropic: env_or("MODELGATE_ANTHROPIC_MODEL", "claude-3-5-haiku-latest"),
            },
            max_body_bytes: env_usize("MODELGATE_MAX_BODY_BYTES").unwrap_or(DEFAULT_MAX_BODY_BYTES),
            upstream_timeout: env_millis("MODELGATE_UPSTREAM_TIMEOUT_MS")
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT)
                .max(MIN_WINDOW),
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            accounting_timeout: DEFAULT_ACCOUNTING_TIMEOUT,
            rate_limit: RateLimitPolicy::clamped(window, max_count),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            default_provider: Provider::Gemini,
            provider_override_var: PROVIDER_OVERRIDE_VAR.to_string(),
            provider_cache_ttl: DEFAULT_PROVIDER_CACHE_TTL,
            models: VendorModels {
                gemini: "gemini-2.0-flash".to_string(),
                openai: "gpt-4o-mini".to_string(),
                anthropic: "claude-3-5-haiku-latest".to_string(),
            },
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            accounting_timeout: DEFAULT_ACCOUNTING_TIMEOUT,
            rate_limit: RateLimitPolicy::clamped(DEFAULT_RATE_WINDOW, DEFAULT_RATE_MAX),
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_millis(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

fn env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

fn env_usize(var: &str) -> Option<usize> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_known_identifiers() {
        assert_eq!(Provider::parse("gemini"), Some(Provider::Gemini));
        assert_eq!(Provider::parse(" OpenAI "), Some(Provider::OpenAi));
        assert_eq!(Provider::parse("anthropic"), Some(Provider::Anthropic));
        assert_eq!(Provider::parse("mistral"), None);
        assert_eq!(Provider::parse(""), None);
    }

    #[test]
    fn test_rate_policy_clamps_floors() {
        let policy = RateLimitPolicy::clamped(Duration::from_millis(10), 0);
        assert_eq!(policy.window, MIN_WINDOW);
        assert_eq!(policy.max_count, 1);

        let sane = RateLimitPolicy::clamped(Duration::from_secs(60), 20);
        assert_eq!(sane.window, Duration::from_secs(60));
        assert_eq!(sane.max_count, 20);
    }
}
