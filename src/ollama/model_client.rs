use crate::{
    config::OllamaConfig,
    error::{FlashgenError, Result},
    models::{ModelInfo, TagsResponse},
};
use reqwest::Client;
use std::sync::Arc;

/// Status and model discovery over `GET /api/tags`.
#[derive(Clone)]
pub struct ModelClient {
    client: Client,
    config: Arc<OllamaConfig>,
}

impl ModelClient {
    pub fn new(client: Client, config: Arc<OllamaConfig>) -> Self {
        Self { client, config }
    }

    /// Lightweight probe used before every generation.
    pub async fn check_connection(&self) -> bool {
        match self
            .client
            .get(self.config.endpoint("/api/tags"))
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log::warn!("Ollama probe returned {}", response.status());
                false
            }
            Err(e) => {
                log::warn!("Ollama probe failed: {}", e);
                false
            }
        }
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(self.config.endpoint("/api/tags"))
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| {
                log::error!("Failed to fetch models: {}", e);
                FlashgenError::ConnectivityError(self.config.base_url.clone())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FlashgenError::ProtocolError {
                status: status.as_u16(),
                message,
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| FlashgenError::SerializationError(e.to_string()))?;
        log::debug!("Ollama reports {} installed models", tags.models.len());
        Ok(tags.models)
    }
}
