use super::model_client::ModelClient;
use super::stream::{FragmentStream, RecordDecoder};
use super::TextGenerator;
use crate::{
    config::OllamaConfig,
    error::{FlashgenError, Result},
    models::GenerationRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Streams completions from `POST /api/generate`.
#[derive(Clone)]
pub struct GenerateClient {
    client: Client,
    config: Arc<OllamaConfig>,
    models: ModelClient,
}

impl GenerateClient {
    pub fn new(client: Client, config: Arc<OllamaConfig>, models: ModelClient) -> Self {
        Self {
            client,
            config,
            models,
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Opens a generation stream for `prompt`.
    ///
    /// Fails with [`FlashgenError::ConfigError`] when no model is configured and
    /// with [`FlashgenError::ConnectivityError`] when the server does not answer
    /// the probe; in both cases no generation request is sent.
    pub async fn generate_stream(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream> {
        if cancel.is_cancelled() {
            return Err(FlashgenError::Cancelled);
        }
        if self.config.model.trim().is_empty() {
            return Err(FlashgenError::ConfigError(
                "No model selected! Please check Ollama settings.".into(),
            ));
        }
        let reachable = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FlashgenError::Cancelled),
            reachable = self.models.check_connection() => reachable,
        };
        if !reachable {
            return Err(FlashgenError::ConnectivityError(self.config.base_url.clone()));
        }

        let request = GenerationRequest::new(&self.config, prompt);
        log::info!("Invoking model: {}", request.model);
        log::debug!(
            "Generation request: {} prompt chars, options {:?}",
            request.prompt.chars().count(),
            request.options
        );

        let send = self
            .client
            .post(self.config.endpoint("/api/generate"))
            .json(&request)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FlashgenError::Cancelled),
            response = send => response.map_err(|e| {
                log::error!("Generation request failed: {}", e);
                FlashgenError::TransportError(e.to_string())
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FlashgenError::Cancelled),
                text = response.text() => text.unwrap_or_default(),
            };
            log::error!("Generation endpoint returned {}: {}", status, message);
            return Err(FlashgenError::ProtocolError {
                status: status.as_u16(),
                message,
            });
        }

        let decoder = RecordDecoder::new(self.config.flush_threshold)
            .with_max_line_bytes(self.config.max_line_bytes);
        Ok(FragmentStream::with_decoder(
            response.bytes_stream(),
            cancel,
            decoder,
        ))
    }

    /// Runs a generation to completion and returns the whole text.
    pub async fn generate(&self, prompt: &str, cancel: CancellationToken) -> Result<String> {
        let _timer = crate::logger::timer("generation");
        self.generate_stream(prompt, cancel).await?.collect_text().await
    }
}

#[async_trait]
impl TextGenerator for GenerateClient {
    async fn generate_stream(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream> {
        GenerateClient::generate_stream(self, prompt, cancel).await
    }
}
