use crate::error::{FlashgenError, Result};

/// Accumulates text fragments until they are worth handing to the caller.
///
/// A flush happens once the pending text reaches `threshold` characters or
/// contains a newline. Whatever is left at the end of a stream comes out
/// through [`FlushBuffer::finish`] regardless of size.
#[derive(Debug)]
pub struct FlushBuffer {
    pending: String,
    pending_chars: usize,
    threshold: usize,
}

impl FlushBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            pending: String::new(),
            pending_chars: 0,
            threshold: threshold.max(1),
        }
    }

    /// Appends `text` and returns the whole buffer if the flush rule now holds.
    pub fn push(&mut self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.pending.push_str(text);
        self.pending_chars += text.chars().count();

        if self.should_flush() {
            Some(self.take())
        } else {
            None
        }
    }

    pub fn should_flush(&self) -> bool {
        self.pending_chars >= self.threshold || self.pending.contains('\n')
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    pub fn len(&self) -> usize {
        self.pending_chars
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> String {
        self.pending_chars = 0;
        std::mem::take(&mut self.pending)
    }
}

/// Splits a byte stream into `\n`-terminated lines.
///
/// Bytes after the last newline are kept for the next read, so a record or a
/// multi-byte character cut by a chunk boundary is rebuilt before decoding.
/// A line longer than `max_line_bytes` fails the read instead of growing
/// without bound.
#[derive(Debug)]
pub struct LineBuffer {
    partial: Vec<u8>,
    max_line_bytes: usize,
    received: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self {
            partial: Vec::new(),
            max_line_bytes: usize::MAX,
            received: 0,
        }
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    /// Feeds one read and returns every line completed by it, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.received += chunk.len();
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.extend(&rest[..pos])?;
            lines.push(decode_line(&std::mem::take(&mut self.partial)));
            rest = &rest[pos + 1..];
        }
        self.extend(rest)?;

        Ok(lines)
    }

    /// Returns the trailing unterminated line once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(decode_line(&std::mem::take(&mut self.partial)))
        }
    }

    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    /// Total bytes fed so far, terminators included.
    pub fn received_bytes(&self) -> usize {
        self.received
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        if self.partial.len() + bytes.len() > self.max_line_bytes {
            self.partial.clear();
            return Err(FlashgenError::TransportError(format!(
                "Stream line exceeded {} bytes without a newline",
                self.max_line_bytes
            )));
        }
        self.partial.extend_from_slice(bytes);
        Ok(())
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
