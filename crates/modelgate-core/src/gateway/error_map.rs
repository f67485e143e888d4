//! Normalization of heterogeneous upstream failures into one stable
//! error contract.
//!
//! `classify` is a closed, ordered decision table over an error's
//! sentinel type and message text. The order matters: messages can match
//! several patterns (a body carrying both "timed out" and "quota" must
//! classify as `Timeout`), so reorderings are behavior changes.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::timeout::Elapsed;
use crate::error::{OracleError, VendorError};

/// Stable wire-level error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MethodNotAllowed,
    PayloadTooLarge,
    BadRequest,
    RateLimited,
    QuotaExceeded,
    Unauthorized,
    ServiceUnavailable,
    UsageUnavailable,
    Timeout,
    SafetyBlock,
    ConfigError,
    ProviderRateLimit,
    InternalError,
}

impl ErrorCode {
    /// HTTP status carried by this code.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::MethodNotAllowed => 405,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::BadRequest => 400,
            ErrorCode::RateLimited => 429,
            ErrorCode::QuotaExceeded => 429,
            ErrorCode::Unauthorized => 401,
            ErrorCode::ServiceUnavailable => 503,
            ErrorCode::UsageUnavailable => 503,
            ErrorCode::Timeout => 504,
            ErrorCode::SafetyBlock => 400,
            ErrorCode::ConfigError => 500,
            ErrorCode::ProviderRateLimit => 429,
            ErrorCode::InternalError => 500,
        }
    }

    /// Whether resubmitting the identical request may succeed.
    pub fn retryable(self) -> bool {
        match self {
            ErrorCode::RateLimited
            | ErrorCode::QuotaExceeded
            | ErrorCode::ServiceUnavailable
            | ErrorCode::UsageUnavailable
            | ErrorCode::Timeout
            | ErrorCode::ProviderRateLimit
            | ErrorCode::InternalError => true,
            ErrorCode::MethodNotAllowed
            | ErrorCode::PayloadTooLarge
            | ErrorCode::BadRequest
            | ErrorCode::Unauthorized
            | ErrorCode::SafetyBlock
            | ErrorCode::ConfigError => false,
        }
    }
}

/// The JSON failure contract returned to callers.
#[derive(Debug, Clone)]
pub struct ErrorPayload {
    pub status: u16,
    pub error_code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    /// Populated only outside production-like environments.
    pub details: Option<serde_json::Value>,
    /// Emitted as a `Retry-After` header when present.
    pub retry_after_seconds: Option<u64>,
}

impl ErrorPayload {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: error_code.http_status(),
            error_code,
            message: message.into(),
            retryable: error_code.retryable(),
            details: None,
            retry_after_seconds: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "ok": false,
            "error_code": self.error_code,
            "message": self.message,
            "retryable": self.retryable,
        });
        if let Some(details) = &self.details {
            body["details"] = details.clone();
        }
        body
    }
}

impl IntoResponse for ErrorPayload {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Retry-After accompanies every rate/quota denial, defaulting to
        // 60s when the denial path did not compute a precise wait.
        let retry_after = self.retry_after_seconds.or(match self.error_code {
            ErrorCode::RateLimited | ErrorCode::QuotaExceeded => Some(60),
            _ => None,
        });

        let body = axum::Json(self.body());
        match retry_after {
            Some(secs) => {
                (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response()
            }
            None => (status, body).into_response(),
        }
    }
}

/// Classify an arbitrary boundary error into the taxonomy.
///
/// Rule order (first match wins):
/// 1. timeout sentinel or timeout phrase -> `Timeout`
/// 2. quota / rate-limit phrasing -> `QuotaExceeded` / `ProviderRateLimit`
/// 3. safety / content-block phrasing -> `SafetyBlock`
/// 4. key / config / unauthorized phrasing -> `Unauthorized` / `ConfigError`
/// 5. default -> `InternalError`
pub fn classify(err: &(dyn std::error::Error + 'static)) -> ErrorCode {
    if is_timeout_sentinel(err) {
        return ErrorCode::Timeout;
    }
    classify_text(&err.to_string())
}

fn is_timeout_sentinel(err: &(dyn std::error::Error + 'static)) -> bool {
    if err.downcast_ref::<Elapsed>().is_some() {
        return true;
    }
    if matches!(err.downcast_ref::<VendorError>(), Some(VendorError::Timeout)) {
        return true;
    }
    matches!(err.downcast_ref::<OracleError>(), Some(OracleError::Timeout))
}

/// The text half of the decision table. Pure over the message.
pub fn classify_text(message: &str) -> ErrorCode {
    let msg = message.to_lowercase();

    // 1. Timeout phrases
    if msg.contains("timed out") || msg.contains("timeout") || msg.contains("deadline exceeded") {
        return ErrorCode::Timeout;
    }

    // 2. Quota / rate limit phrases. Quota-specific wording wins over the
    // generic provider rate limit code.
    if msg.contains("quota") || msg.contains("resource exhausted") || msg.contains("resource has been exhausted") {
        return ErrorCode::QuotaExceeded;
    }
    if msg.contains("rate limit") || msg.contains("too many requests") || msg.contains("429") {
        return ErrorCode::ProviderRateLimit;
    }

    // 3. Safety / content block phrases
    if msg.contains("safety") || msg.contains("blocked") || msg.contains("content policy") {
        return ErrorCode::SafetyBlock;
    }

    // 4. Credential / configuration phrases
    if msg.contains("unauthorized") {
        return ErrorCode::Unauthorized;
    }
    if msg.contains("api key") || msg.contains("api_key") || msg.contains("forbidden") || msg.contains("not configured") {
        return ErrorCode::ConfigError;
    }

    // 5. Conservative default: most unclassified failures are transient.
    ErrorCode::InternalError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_sentinel_wins() {
        assert_eq!(classify(&Elapsed), ErrorCode::Timeout);
        assert_eq!(classify(&VendorError::Timeout), ErrorCode::Timeout);
        assert_eq!(classify(&OracleError::Timeout), ErrorCode::Timeout);
    }

    #[test]
    fn test_timeout_phrase_beats_quota_phrase() {
        // Rule 1 wins over rule 2 even when both patterns match.
        assert_eq!(
            classify_text("request timed out while checking quota"),
            ErrorCode::Timeout
        );
    }

    #[test]
    fn test_quota_vs_provider_rate_limit() {
        assert_eq!(classify_text("Quota exceeded for model"), ErrorCode::QuotaExceeded);
        assert_eq!(
            classify_text("Resource has been exhausted (e.g. check quota)"),
            ErrorCode::QuotaExceeded
        );
        assert_eq!(classify_text("Rate limit hit, slow down"), ErrorCode::ProviderRateLimit);
        assert_eq!(classify_text("HTTP 429 Too Many Requests"), ErrorCode::ProviderRateLimit);
    }

    #[test]
    fn test_safety_block_not_retryable() {
        let code = classify_text("Response blocked by safety filters");
        assert_eq!(code, ErrorCode::SafetyBlock);
        assert!(!code.retryable());
        assert_eq!(code.http_status(), 400);
    }

    #[test]
    fn test_credential_and_config_phrases() {
        assert_eq!(classify_text("401 Unauthorized"), ErrorCode::Unauthorized);
        assert_eq!(classify_text("Invalid API key supplied"), ErrorCode::ConfigError);
        assert_eq!(classify_text("provider not configured"), ErrorCode::ConfigError);
    }

    #[test]
    fn test_rate_limit_and_unauthorized_resolves_by_rule_order() {
        // Quota/rate rules are checked before credential rules.
        assert_eq!(
            classify_text("rate limit reached for unauthorized tier"),
            ErrorCode::ProviderRateLimit
        );
    }

    #[test]
    fn test_default_is_retryable_internal() {
        let code = classify_text("connection reset by peer");
        assert_eq!(code, ErrorCode::InternalError);
        assert!(code.retryable());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let msg = "Resource exhausted: rate limit and quota and timeout all at once";
        let first = classify_text(msg);
        for _ in 0..10 {
            assert_eq!(classify_text(msg), first);
        }
    }
}
