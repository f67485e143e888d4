use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Provider;
use crate::error::VendorError;
use crate::external::Vendor;

/// HTTP client for one upstream AI vendor.
///
/// Each vendor has its own wire shape; failures all funnel into
/// [`VendorError`] and from there through the error mapper. The raw
/// error body is kept in the variant for classification, never for the
/// caller.
pub struct HttpVendor {
    provider: Provider,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpVendor {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        let base_url = match provider {
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::OpenAi => "https://api.openai.com",
            Provider::Anthropic => "https://api.anthropic.com",
        };
        Self::with_base_url(provider, base_url, api_key)
    }

    pub fn with_base_url(
        provider: Provider,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            client: super::http_client(Duration::from_secs(90)),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn request(&self, model: &str, input: &Value) -> reqwest::RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        match self.provider {
            Provider::Gemini => self
                .client
                .post(format!("{}/v1beta/models/{}:generateContent", base, model))
                .header("x-goog-api-key", &self.api_key)
                .json(input),
            Provider::OpenAi => {
                let body = with_model_field(input.clone(), model);
                self.client
                    .post(format!("{}/v1/chat/completions", base))
                    .bearer_auth(&self.api_key)
                    .json(&body)
            }
            Provider::Anthropic => {
                let body = with_model_field(input.clone(), model);
                self.client
                    .post(format!("{}/v1/messages", base))
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
            }
        }
    }
}

/// Fill in the `model` field when the caller passed an object without one.
fn with_model_field(input: Value, model: &str) -> Value {
    match input {
        Value::Object(mut obj) => {
            obj.entry("model").or_insert_with(|| Value::String(model.to_string()));
            Value::Object(obj)
        }
        other => other,
    }
}

#[async_trait]
impl Vendor for HttpVendor {
    async fn call(&self, model: &str, input: Value) -> Result<Value, VendorError> {
        if self.api_key.is_empty() {
            return Err(VendorError::Status {
                status: 500,
                message: format!("{} api key not configured", self.provider),
            });
        }

        let response = self.request(model, &input).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.provider, %status, "vendor error body: {}", message);
            return Err(VendorError::Status { status: status.as_u16(), message });
        }

        Ok(response.json::<Value>().await?)
    }
}
