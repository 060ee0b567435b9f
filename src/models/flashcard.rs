use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratingState {
    pub question: bool,
    pub answer: bool,
}

/// A document chunk and the flashcard generated from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub id: usize,
    pub context: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub generating: GeneratingState,
}

impl QaPair {
    pub fn new(id: usize, context: impl Into<String>) -> Self {
        Self {
            id,
            context: context.into(),
            question: String::new(),
            answer: String::new(),
            selected: false,
            generating: GeneratingState::default(),
        }
    }

    /// Rows numbered from 1, in chunk order.
    pub fn from_chunks(chunks: Vec<String>) -> Vec<QaPair> {
        chunks
            .into_iter()
            .enumerate()
            .map(|(idx, chunk)| QaPair::new(idx + 1, chunk))
            .collect()
    }

    pub fn is_generating(&self) -> bool {
        self.generating.question || self.generating.answer
    }
}
