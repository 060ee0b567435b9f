pub mod config;
pub mod error;
pub mod flashcards;
pub mod logger;
pub mod models;
pub mod ollama;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use config::{ChunkingAlgorithm, ChunkingConfig, Config, OllamaConfig, PromptConfig};
pub use error::{FlashgenError, Result};
pub use flashcards::{
    chunk_document, BatchReport, FlashcardGenerator, Generated, Outcome, RecursiveSplitter,
    TextAccumulator,
};
pub use models::*;
pub use ollama::{
    FlushBuffer, FragmentStream, GenerateClient, LineBuffer, ModelClient, OllamaClient,
    TextGenerator,
};
pub use session::{GenerationHandle, GenerationSlot};
