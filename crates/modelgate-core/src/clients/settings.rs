use std::time::Duration;

use async_trait::async_trait;

use crate::error::SettingsError;
use crate::external::{AiDefaults, SettingsStore};

/// Reads AI defaults from the external settings service.
pub struct HttpSettingsStore {
    client: reqwest::Client,
    defaults_url: String,
}

impl HttpSettingsStore {
    pub fn new(defaults_url: impl Into<String>) -> Self {
        Self {
            client: super::http_client(Duration::from_secs(5)),
            defaults_url: defaults_url.into(),
        }
    }
}

#[async_trait]
impl SettingsStore for HttpSettingsStore {
    async fn ai_defaults(&self) -> Result<AiDefaults, SettingsError> {
        let response = self
            .client
            .get(&self.defaults_url)
            .send()
            .await
            .map_err(|e| SettingsError::Transport(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Err(SettingsError::Missing);
        }
        if !response.status().is_success() {
            return Err(SettingsError::Transport(format!(
                "settings store answered {}",
                response.status()
            )));
        }

        response
            .json::<AiDefaults>()
            .await
            .map_err(|e| SettingsError::Malformed(e.to_string()))
    }
}
