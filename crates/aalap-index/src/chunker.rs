//! Word-window chunking with fixed overlap.
//!
//! Units are whitespace-delimited words. Chunk text is sliced from the input, so
//! line breaks and indentation inside a window survive.

use aalap_store::OrgConfig;

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl From<&OrgConfig> for ChunkerConfig {
    fn from(config: &OrgConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] if `chunk_size` is zero or the overlap is
    /// not smaller than the size.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(IndexError::Configuration(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(IndexError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let spans = word_spans(text);
        if spans.is_empty() {
            return Vec::new();
        }

        let step = self.config.chunk_size - self.config.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.config.chunk_size).min(spans.len());
            chunks.push(text[spans[start].0..spans[end - 1].1].to_owned());
            if end == spans.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// Byte ranges of whitespace-delimited words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut current: Option<usize> = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), current) {
            (true, Some(s)) => {
                spans.push((s, i));
                current = None;
            }
            (false, None) => current = Some(i),
            _ => {}
        }
    }
    if let Some(s) = current {
        spans.push((s, text.len()));
    }
    spans
}
