use std::time::{Duration, Instant};

/// Running total of a generation, with throttled publication.
///
/// The text only ever grows until [`TextAccumulator::reset`]. `push` reports
/// whether the caller should publish now; `flush` reports whether a final
/// publication is still owed.
#[derive(Debug)]
pub struct TextAccumulator {
    text: String,
    interval: Duration,
    last_publish: Option<Instant>,
    dirty: bool,
}

impl TextAccumulator {
    pub fn new(interval: Duration) -> Self {
        Self {
            text: String::new(),
            interval,
            last_publish: None,
            dirty: false,
        }
    }

    /// Publishes after every fragment.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn push(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        self.text.push_str(fragment);
        self.dirty = true;

        let due = match self.last_publish {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if due {
            self.mark_published();
        }
        due
    }

    pub fn flush(&mut self) -> bool {
        if self.dirty {
            self.mark_published();
            true
        } else {
            false
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.last_publish = None;
        self.dirty = false;
    }

    fn mark_published(&mut self) {
        self.last_publish = Some(Instant::now());
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_publishes_every_fragment() {
        let mut acc = TextAccumulator::immediate();
        assert!(acc.push("Hello "));
        assert!(acc.push("world"));
        assert!(!acc.flush());
        assert_eq!(acc.text(), "Hello world");
    }

    #[test]
    fn throttled_publishes_first_then_coalesces() {
        let mut acc = TextAccumulator::new(Duration::from_secs(3600));
        assert!(acc.push("a"));
        assert!(!acc.push("b"));
        assert!(!acc.push("c"));
        assert!(acc.flush());
        assert!(!acc.flush());
        assert_eq!(acc.text(), "abc");
    }

    #[test]
    fn empty_fragment_is_ignored() {
        let mut acc = TextAccumulator::immediate();
        assert!(!acc.push(""));
        assert!(!acc.flush());
    }

    #[test]
    fn reset_clears_between_generations() {
        let mut acc = TextAccumulator::immediate();
        acc.push("old");
        acc.reset();
        assert_eq!(acc.text(), "");
        assert!(acc.push("new"));
        assert_eq!(acc.into_text(), "new");
    }
}
