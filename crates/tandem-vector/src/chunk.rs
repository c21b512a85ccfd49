//! Word-based text chunking.
//!
//! Splits text on whitespace into windows of `size` words where consecutive
//! windows share `overlap` words. Boundaries depend only on the input and the
//! two parameters.

use tandem_core::{Error, Result};

/// Deterministic word chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. `overlap` must be smaller than `size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::config("chunk size must be at least 1 word"));
        }
        if overlap >= size {
            return Err(Error::config(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    /// Words per chunk.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Words shared by consecutive chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into chunks. Empty text yields a single empty chunk so
    /// every record produces at least one vector record.
    pub fn split(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() <= self.size {
            return vec![words.join(" ")];
        }

        let step = self.size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: 256,
            overlap: 32,
        }
    }
}
