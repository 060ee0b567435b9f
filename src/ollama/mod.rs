pub mod buffer;
pub mod generate_client;
pub mod model_client;
pub mod stream;

use crate::{config::OllamaConfig, error::Result, models::ModelInfo};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use buffer::{FlushBuffer, LineBuffer};
pub use generate_client::GenerateClient;
pub use model_client::ModelClient;
pub use stream::{FragmentStream, RecordDecoder};

/// Anything that can turn a prompt into a stream of text fragments.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_stream(&self, prompt: &str, cancel: CancellationToken)
        -> Result<FragmentStream>;
}

#[derive(Clone)]
pub struct OllamaClient {
    generate_client: GenerateClient,
    model_client: ModelClient,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let client = Client::new();
        let model_client = ModelClient::new(client.clone(), config.clone());

        Ok(Self {
            generate_client: GenerateClient::new(client, config, model_client.clone()),
            model_client,
        })
    }

    pub fn text(&self) -> &GenerateClient {
        &self.generate_client
    }

    pub fn models(&self) -> &ModelClient {
        &self.model_client
    }

    pub fn config(&self) -> &OllamaConfig {
        self.generate_client.config()
    }

    pub async fn check_connection(&self) -> bool {
        self.model_client.check_connection().await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.model_client.list_models().await
    }

    /// Copy of this client that generates with `model`.
    pub fn with_model(&self, model: impl Into<String>) -> Result<Self> {
        Self::new(self.config().clone().with_model(model))
    }
}
