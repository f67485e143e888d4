//! Per-request composition of the admission components.
//!
//! Order: key resolution -> rate limit -> usage pre-check -> provider
//! resolution -> deadline-bounded upstream call -> detached accounting.
//! Every denial is produced before the expensive upstream call; every
//! upstream failure passes through the error mapper.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{GatewayConfig, Provider};
use crate::external::{AuthVerifier, UsageOracle, UsageStatus, Vendor};
use crate::gateway::admission_key::{resolve_key, AdmissionKey};
use crate::gateway::error_map::{classify, ErrorCode, ErrorPayload};
use crate::gateway::provider::ProviderResolver;
use crate::gateway::rate_limit::{RateDecision, RateLimiter};
use crate::gateway::timeout::with_timeout;
use crate::gateway::usage::{Admission, UsageGuard};

/// Cost charged against the ledger per admitted request.
const UNITS_PER_REQUEST: i64 = 1;

/// Parsed body of a gateway request.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    /// Optional model override; the per-vendor default applies otherwise.
    pub model: Option<String>,
    pub input: Value,
}

/// Everything a handler needs to build the success response.
#[derive(Debug)]
pub struct GatewayOutcome {
    pub data: Value,
    pub provider: Provider,
    pub rate_remaining: u32,
    pub rate_reset_epoch: i64,
    pub usage: UsageStatus,
}

pub struct Gateway {
    config: GatewayConfig,
    verifier: Arc<dyn AuthVerifier>,
    oracle: Arc<dyn UsageOracle>,
    vendors: HashMap<Provider, Arc<dyn Vendor>>,
    limiter: RateLimiter,
    resolver: ProviderResolver,
    guard: UsageGuard,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        verifier: Arc<dyn AuthVerifier>,
        store: Arc<dyn crate::external::SettingsStore>,
        oracle: Arc<dyn UsageOracle>,
        vendors: HashMap<Provider, Arc<dyn Vendor>>,
    ) -> Self {
        let resolver = ProviderResolver::with_override_var(
            store,
            config.default_provider,
            config.provider_cache_ttl,
            config.provider_override_var.clone(),
        );
        let guard = UsageGuard::new(Arc::clone(&oracle), config.oracle_timeout);
        Self {
            config,
            verifier,
            oracle,
            vendors,
            limiter: RateLimiter::new(),
            resolver,
            guard,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the full admission pipeline for one inbound request.
    pub async fn handle(
        &self,
        headers: &HeaderMap,
        socket: Option<SocketAddr>,
        request: GenerateRequest,
    ) -> Result<GatewayOutcome, ErrorPayload> {
        let key = resolve_key(self.verifier.as_ref(), headers, socket).await;

        // Critical admission checks, cheapest first.
        let decision = self.limiter.check(
            &format!("generate:{}", key),
            self.config.rate_limit,
            SystemTime::now(),
        );
        let (rate_remaining, rate_reset_epoch) = match &decision {
            RateDecision::Allowed { remaining, .. } => {
                (*remaining, decision.reset_epoch_seconds())
            }
            RateDecision::Limited { retry_after_seconds, .. } => {
                return Err(ErrorPayload::new(
                    ErrorCode::RateLimited,
                    "Too many requests. Please slow down.",
                )
                .with_retry_after(*retry_after_seconds));
            }
        };

        let usage = match self.guard.admit(&key, UNITS_PER_REQUEST).await {
            Admission::Admitted { usage } => usage,
            Admission::Denied(payload) => return Err(payload),
        };

        let provider = self.resolver.resolve().await;
        let Some(vendor) = self.vendors.get(&provider) else {
            tracing::error!(provider = %provider, "no vendor client registered");
            return Err(self.payload_for(
                ErrorCode::ConfigError,
                format!("Provider {} is not configured", provider),
                None,
            ));
        };

        let model = request
            .model
            .unwrap_or_else(|| self.config.models.for_provider(provider).to_string());

        tracing::info!(key = %key, provider = %provider, model, "forwarding to upstream");

        let vendor = Arc::clone(vendor);
        let input = request.input;
        let called = {
            let model = model.clone();
            with_timeout(self.config.upstream_timeout, async move {
                vendor.call(&model, input).await
            })
            .await
        };

        let data = match called {
            Err(elapsed) => {
                tracing::warn!(provider = %provider, model, "upstream call exceeded deadline");
                return Err(self.payload_for(
                    classify(&elapsed),
                    "The AI provider took too long to respond",
                    None,
                ));
            }
            Ok(Err(e)) => {
                let code = classify(&e);
                tracing::warn!(provider = %provider, code = ?code, "upstream call failed: {}", e);
                return Err(self.payload_for(code, safe_message(code), Some(&e)));
            }
            Ok(Ok(data)) => data,
        };

        self.spawn_accounting(key);

        Ok(GatewayOutcome {
            data,
            provider,
            rate_remaining,
            rate_reset_epoch,
            usage,
        })
    }

    /// Best-effort post-success accounting: detached, bounded, allowed to
    /// fail silently by design. The user-visible request has already
    /// succeeded, so nothing here may surface.
    fn spawn_accounting(&self, key: AdmissionKey) {
        let oracle = Arc::clone(&self.oracle);
        let limit = self.config.accounting_timeout;
        tokio::spawn(async move {
            let inner_key = key.clone();
            let inner = Arc::clone(&oracle);
            let result = with_timeout(limit, async move {
                inner.increment(&inner_key, UNITS_PER_REQUEST).await
            })
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(key = %key, "usage increment failed: {}", e),
                Err(_) => tracing::debug!(key = %key, "usage increment timed out"),
            }
        });
    }

    fn payload_for(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        source: Option<&crate::error::VendorError>,
    ) -> ErrorPayload {
        let payload = ErrorPayload::new(code, message);
        // Raw upstream detail is only exposed outside production, and
        // even then truncated to a whitelisted subset.
        if self.config.environment.is_production() {
            return payload;
        }
        match source {
            Some(e) => {
                let text: String = e.to_string().chars().take(300).collect();
                payload.with_details(json!({
                    "name": "VendorError",
                    "message": text,
                    "status": code.http_status(),
                }))
            }
            None => payload,
        }
    }
}

/// Client-safe message per code for upstream failures; never the raw
/// vendor text.
fn safe_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::QuotaExceeded => "The AI provider's quota is exhausted. Please try again later.",
        ErrorCode::ProviderRateLimit => "The AI provider is rate limiting requests. Please retry.",
        ErrorCode::SafetyBlock => "The request was blocked by the provider's safety filters.",
        ErrorCode::Unauthorized => "The request was not authorized by the AI provider.",
        ErrorCode::ConfigError => "The AI provider is misconfigured.",
        ErrorCode::Timeout => "The AI provider took too long to respond",
        _ => "The AI request failed. Please try again.",
    }
}
