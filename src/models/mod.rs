pub mod flashcard;
pub mod generation;

pub use flashcard::*;
pub use generation::*;
