use crate::config::{ChunkingAlgorithm, ChunkingConfig};
use crate::error::{FlashgenError, Result};
use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits document text into the contexts that flashcards are generated from.
pub fn chunk_document(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Err(FlashgenError::ConfigError(
            "No document text found. Please upload a file first.".into(),
        ));
    }

    let chunks = match config.algorithm {
        ChunkingAlgorithm::Recursive => {
            RecursiveSplitter::new(config.chunk_size, config.chunk_overlap)?.split_text(text)
        }
        ChunkingAlgorithm::Line => split_lines(text),
        ChunkingAlgorithm::LineWithHeader => split_lines_with_header(text),
    };
    log::info!("Split document into {} chunks ({:?})", chunks.len(), config.algorithm);
    Ok(chunks)
}

/// Character splitter that tries paragraph, line, word and finally character
/// boundaries, merging neighbours back up to `chunk_size` characters with
/// `chunk_overlap` characters carried between consecutive chunks.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(FlashgenError::ConfigError(
                "Chunk size must be greater than zero".into(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(FlashgenError::ConfigError(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split(text, &SEPARATORS)
    }

    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small, separator));
                small.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split(piece, finer));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let joined_len = |window: &VecDeque<&str>| {
            if window.is_empty() {
                0
            } else {
                separator_len
            }
        };

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len + joined_len(&window) > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    log::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        self.chunk_size
                    );
                }
                chunks.extend(join_trimmed(&window, separator));

                // Keep at most `chunk_overlap` characters as the start of the next chunk.
                while total > self.chunk_overlap
                    || (total > 0 && total + len + joined_len(&window) > self.chunk_size)
                {
                    let Some(first) = window.pop_front() else {
                        break;
                    };
                    total = total.saturating_sub(char_len(first) + joined_len(&window));
                }
            }
            total += len + joined_len(&window);
            window.push_back(piece);
        }

        chunks.extend(join_trimmed(&window, separator));
        chunks
    }
}

fn pick_separator<'a, 's>(text: &str, separators: &'a [&'s str]) -> (&'s str, &'a [&'s str]) {
    for (i, &separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn join_trimmed(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// One chunk per non-blank line.
fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Treats the first line as a header and prefixes it to every other line.
/// Newlines inside double quotes belong to the current line, as in CSV.
fn split_lines_with_header(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut inside_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                inside_quotes = !inside_quotes;
                current.push(c);
            }
            '\n' if !inside_quotes => {
                push_trimmed(&mut lines, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_trimmed(&mut lines, &current);

    let mut lines = lines.into_iter();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    lines.map(|line| format!("{}\n{}", header, line)).collect()
}

fn push_trimmed(lines: &mut Vec<String>, line: &str) {
    let line = line.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
}
