use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AuthError;
use crate::external::{AuthVerifier, VerifiedCaller};

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    ok: bool,
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// Verifies bearer credentials against the external auth service.
pub struct HttpAuthVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpAuthVerifier {
    pub fn new(verify_url: impl Into<String>) -> Self {
        Self {
            client: super::http_client(Duration::from_secs(5)),
            verify_url: verify_url.into(),
        }
    }
}

#[async_trait]
impl AuthVerifier for HttpAuthVerifier {
    async fn verify(&self, bearer: &str) -> Result<VerifiedCaller, AuthError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&json!({ "token": bearer }))
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Rejected(format!(
                "verifier answered {}",
                response.status()
            )));
        }

        let body: VerifyResponse =
            response.json().await.map_err(|e| AuthError::Transport(e.to_string()))?;

        match (body.ok, body.user_id) {
            (true, Some(user_id)) if !user_id.is_empty() => Ok(VerifiedCaller { user_id }),
            _ => Err(AuthError::Rejected("credential not recognized".to_string())),
        }
    }
}
