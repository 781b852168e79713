//! Sliding-window text chunking.
//!
//! Text is split into windows of `chunk_size` characters, each starting
//! `chunk_size - chunk_overlap` characters after the previous one. Lengths are
//! counted in `char`s so multi-byte characters are never split.

use insight_core::ChunkingConfig;
use tracing::warn;

/// Splits extracted document text into overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Build a chunker. Invalid settings are clamped so the window always
    /// advances: size is at least 1 and overlap is below size.
    pub fn new(config: ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let chunk_overlap = config.chunk_overlap.min(chunk_size - 1);
        if chunk_size != config.chunk_size || chunk_overlap != config.chunk_overlap {
            warn!(
                "Clamped chunking config {}/{} to {}/{}",
                config.chunk_size, config.chunk_overlap, chunk_size, chunk_overlap
            );
        }
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered chunks.
    ///
    /// Text no longer than `chunk_size` comes back as a single chunk, including
    /// the empty string.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        self.spans_for_len(chars.len())
            .into_iter()
            .map(|(start, end)| chars[start..end].iter().collect())
            .collect()
    }

    /// Character offsets `(start, end)` of each chunk `chunk` would produce.
    pub fn chunk_spans(&self, text: &str) -> Vec<(usize, usize)> {
        self.spans_for_len(text.chars().count())
    }

    fn spans_for_len(&self, len: usize) -> Vec<(usize, usize)> {
        if len <= self.chunk_size {
            return vec![(0, len)];
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut spans = Vec::with_capacity(len / step + 1);
        let mut start = 0;
        loop {
            spans.push((start, (start + self.chunk_size).min(len)));
            start += step;
            // The previous window already reaches the end of the text.
            if start + self.chunk_overlap >= len {
                break;
            }
        }
        spans
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}
