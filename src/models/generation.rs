use crate::config::OllamaConfig;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub num_ctx: u32,
}

impl GenerationRequest {
    pub fn new(config: &OllamaConfig, prompt: impl Into<String>) -> Self {
        Self {
            model: config.model.clone(),
            prompt: prompt.into(),
            stream: true,
            options: GenerationOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                seed: config.use_fixed_seed.then_some(config.seed),
                num_ctx: config.num_ctx,
            },
        }
    }
}

/// One line of the streamed response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_seed_unless_fixed() {
        let config = OllamaConfig::new().with_model("llama3");
        let body = serde_json::to_value(GenerationRequest::new(&config, "hi")).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llama3",
                "prompt": "hi",
                "stream": true,
                "options": { "temperature": 0.7f32, "top_p": 0.9f32, "num_ctx": 2048 }
            })
        );

        let seeded = config.with_fixed_seed(7);
        let body = serde_json::to_value(GenerationRequest::new(&seeded, "hi")).unwrap();
        assert_eq!(body["options"]["seed"], json!(7));
    }

    #[test]
    fn test_stream_record_defaults() {
        let record: StreamRecord = serde_json::from_str(r#"{"model":"m"}"#).unwrap();
        assert!(record.response.is_none());
        assert!(!record.done);

        let record: StreamRecord =
            serde_json::from_str(r#"{"response":"","done":true,"total_duration":12}"#).unwrap();
        assert_eq!(record.response.as_deref(), Some(""));
        assert!(record.done);
    }
}
