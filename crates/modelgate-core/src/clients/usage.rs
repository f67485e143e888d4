use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::OracleError;
use crate::external::{UsageOracle, UsageStatus};
use crate::gateway::admission_key::AdmissionKey;

/// Talks to the external usage ledger service.
///
/// `check` reads the remaining allowance; `increment` records consumption
/// after a successful upstream call. The gateway calls `increment`
/// detached and ignores its errors.
pub struct HttpUsageOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUsageOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            // Transport backstop slightly above the gateway's own 8s bound
            // so the gateway deadline is the one that fires.
            client: super::http_client(Duration::from_secs(10)),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl UsageOracle for HttpUsageOracle {
    async fn check(&self, key: &AdmissionKey, units: i64) -> Result<UsageStatus, OracleError> {
        let response = self
            .client
            .post(self.url("usage/check"))
            .json(&json!({ "key": key.to_string(), "units": units }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status: status.as_u16(), message });
        }

        Ok(response.json::<UsageStatus>().await?)
    }

    async fn increment(&self, key: &AdmissionKey, units: i64) -> Result<(), OracleError> {
        let response = self
            .client
            .post(self.url("usage/increment"))
            .json(&json!({ "key": key.to_string(), "units": units }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status: status.as_u16(), message });
        }
        Ok(())
    }
}
