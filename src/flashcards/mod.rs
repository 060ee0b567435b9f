pub mod accumulator;
pub mod chunking;
pub mod generator;

pub use accumulator::TextAccumulator;
pub use chunking::{chunk_document, RecursiveSplitter};
pub use generator::{BatchReport, FlashcardGenerator, Generated, Outcome};
