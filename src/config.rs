use crate::error::{FlashgenError, Result};
use crate::logger::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub use_fixed_seed: bool,
    pub seed: i64,
    pub num_ctx: u32,
    /// Buffered characters that force a fragment out even without a newline.
    pub flush_threshold: usize,
    /// Longest stream record accepted before the response is abandoned.
    pub max_line_bytes: usize,
    pub probe_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: String::new(),
            temperature: 0.7,
            top_p: 0.9,
            use_fixed_seed: false,
            seed: 42,
            num_ctx: 2048,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl OllamaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let seed = env_parse::<i64>("OLLAMA_SEED");

        OllamaConfig {
            base_url: env::var("OLLAMA_BASE_URL").unwrap_or(defaults.base_url),
            model: env::var("OLLAMA_MODEL").unwrap_or(defaults.model),
            temperature: env_parse("OLLAMA_TEMPERATURE").unwrap_or(defaults.temperature),
            top_p: env_parse("OLLAMA_TOP_P").unwrap_or(defaults.top_p),
            use_fixed_seed: seed.is_some(),
            seed: seed.unwrap_or(defaults.seed),
            num_ctx: env_parse("OLLAMA_NUM_CTX").unwrap_or(defaults.num_ctx),
            flush_threshold: env_parse("FLASHGEN_FLUSH_THRESHOLD")
                .unwrap_or(defaults.flush_threshold),
            max_line_bytes: env_parse("FLASHGEN_MAX_LINE_BYTES").unwrap_or(defaults.max_line_bytes),
            probe_timeout: env_parse("OLLAMA_PROBE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    pub fn with_fixed_seed(mut self, seed: i64) -> Self {
        self.use_fixed_seed = true;
        self.seed = seed;
        self
    }

    pub fn with_num_ctx(mut self, num_ctx: u32) -> Self {
        self.num_ctx = num_ctx;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Base URL without a trailing slash, ready for path joining.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            FlashgenError::ConfigError(format!(
                "Invalid Ollama base URL '{}': {}",
                self.base_url, e
            ))
        })?;
        if self.flush_threshold == 0 {
            return Err(FlashgenError::ConfigError(
                "Flush threshold must be at least 1".into(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(FlashgenError::ConfigError(
                "Max line bytes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub summary: String,
    pub question: String,
    pub answer: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        PromptConfig {
            summary: "Please provide a concise summary of the following content:".to_string(),
            question: "Please read the following text (and summary) and create a single and short and relevant question related to the text. Don't add any markdown or greetings. Only the question.".to_string(),
            answer: "Based on the text (and summary) plus the question, provide a concise answer. Don't add any markdown or greetings. Only the Answer.".to_string(),
        }
    }
}

impl PromptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        PromptConfig {
            summary: env::var("FLASHGEN_SUMMARY_PROMPT").unwrap_or(defaults.summary),
            question: env::var("FLASHGEN_QUESTION_PROMPT").unwrap_or(defaults.question),
            answer: env::var("FLASHGEN_ANSWER_PROMPT").unwrap_or(defaults.answer),
        }
    }

    pub fn with_summary(mut self, prompt: impl Into<String>) -> Self {
        self.summary = prompt.into();
        self
    }

    pub fn with_question(mut self, prompt: impl Into<String>) -> Self {
        self.question = prompt.into();
        self
    }

    pub fn with_answer(mut self, prompt: impl Into<String>) -> Self {
        self.answer = prompt.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingAlgorithm {
    Recursive,
    Line,
    LineWithHeader,
}

impl FromStr for ChunkingAlgorithm {
    type Err = FlashgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recursive" => Ok(ChunkingAlgorithm::Recursive),
            "line" => Ok(ChunkingAlgorithm::Line),
            "line-with-header" | "line_with_header" => Ok(ChunkingAlgorithm::LineWithHeader),
            other => Err(FlashgenError::ConfigError(format!(
                "Unknown chunking algorithm: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub algorithm: ChunkingAlgorithm,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            algorithm: ChunkingAlgorithm::Recursive,
            chunk_size: 500,
            chunk_overlap: 0,
        }
    }
}

impl ChunkingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let algorithm = match env::var("FLASHGEN_CHUNKING") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                log::warn!("{}, falling back to recursive", e);
                defaults.algorithm
            }),
            Err(_) => defaults.algorithm,
        };

        ChunkingConfig {
            algorithm,
            chunk_size: env_parse("FLASHGEN_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            chunk_overlap: env_parse("FLASHGEN_CHUNK_OVERLAP").unwrap_or(defaults.chunk_overlap),
        }
    }

    pub fn with_algorithm(mut self, algorithm: ChunkingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_size(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub prompts: PromptConfig,
    pub chunking: ChunkingConfig,
    /// Minimum spacing between progress publications for Q&A rows.
    pub publish_interval: Duration,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ollama: OllamaConfig::default(),
            prompts: PromptConfig::default(),
            chunking: ChunkingConfig::default(),
            publish_interval: Duration::from_millis(100),
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Config {
            ollama: OllamaConfig::from_env(),
            prompts: PromptConfig::from_env(),
            chunking: ChunkingConfig::from_env(),
            publish_interval: env_parse("FLASHGEN_PUBLISH_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_interval),
            log_level: env::var("FLASHGEN_LOG_LEVEL")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(defaults.log_level),
        }
    }

    pub fn with_ollama(mut self, config: OllamaConfig) -> Self {
        self.ollama = config;
        self
    }

    pub fn with_prompts(mut self, config: PromptConfig) -> Self {
        self.prompts = config;
        self
    }

    pub fn with_chunking(mut self, config: ChunkingConfig) -> Self {
        self.chunking = config;
        self
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
