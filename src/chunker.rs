//! Word-window document chunking.
//!
//! Splits a long bill text into overlapping segments so each analysis call
//! stays within the model's context window. Chunks are byte ranges of the
//! original text: the non-overlap regions of consecutive chunks tile the
//! input exactly.

use crate::errors::ConfigError;
use serde::Serialize;

/// Separators tried in priority order when choosing a cut point.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Chunking settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// When false, the whole document is a single chunk.
    pub enabled: bool,
    /// Maximum words per chunk, overlap included.
    pub max_words: usize,
    /// Trailing words of a chunk repeated at the start of the next.
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_words: 50_000,
            overlap_words: 200,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_words == 0 {
            return Err(ConfigError::invalid("chunk_max_words", "must be at least 1"));
        }
        if self.overlap_words >= self.max_words {
            return Err(ConfigError::invalid(
                "chunk_overlap_words",
                format!(
                    "overlap ({}) must be smaller than the chunk size ({})",
                    self.overlap_words, self.max_words
                ),
            ));
        }
        Ok(())
    }
}

/// One segment of a chunked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the chunk sequence.
    pub index: usize,
    /// Segment text, starting with the overlap region.
    pub text: String,
    /// Byte length of the leading overlap copied from the previous chunk.
    pub overlap_len: usize,
}

impl Chunk {
    fn whole(text: &str) -> Self {
        Self {
            index: 0,
            text: text.to_string(),
            overlap_len: 0,
        }
    }

    /// Text repeated from the previous chunk.
    pub fn overlap(&self) -> &str {
        &self.text[..self.overlap_len]
    }

    /// Text that appears in no earlier chunk.
    pub fn fresh(&self) -> &str {
        &self.text[self.overlap_len..]
    }
}

/// Split `text` into chunks according to `config`.
///
/// Empty input yields a single empty chunk.
pub fn chunk(text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    if !config.enabled || config.max_words == 0 {
        return vec![Chunk::whole(text)];
    }

    let words = word_spans(text);
    if words.len() <= config.max_words {
        return vec![Chunk::whole(text)];
    }

    let overlap_words = config.overlap_words.min(config.max_words - 1);
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut first_word = 0;
    let mut overlap_len = 0;

    loop {
        if words.len() - first_word <= config.max_words {
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[chunk_start..].to_string(),
                overlap_len,
            });
            break;
        }

        let content_start = chunk_start + overlap_len;
        let last_fit = words[first_word + config.max_words - 1].1;
        let next_word = words[first_word + config.max_words].0;
        let half_full = words[first_word + config.max_words / 2].0;
        let boundary = cut_point(text, content_start, next_word, half_full).unwrap_or(last_fit);

        chunks.push(Chunk {
            index: chunks.len(),
            text: text[chunk_start..boundary].to_string(),
            overlap_len,
        });

        let end_word = words.partition_point(|&(_, end)| end <= boundary);
        let carried = overlap_words.min(end_word - first_word);
        first_word = end_word - carried;
        if carried == 0 {
            chunk_start = boundary;
            overlap_len = 0;
        } else {
            chunk_start = words[first_word].0;
            overlap_len = boundary - chunk_start;
        }
    }

    chunks
}

/// Pick the end of the current chunk: just after the last occurrence of the
/// highest-priority separator that leaves the chunk at least half full.
/// `None` means only the empty separator applies.
fn cut_point(text: &str, content_start: usize, window_end: usize, half_full: usize) -> Option<usize> {
    let window = &text[content_start..window_end];
    SEPARATORS
        .iter()
        .take_while(|separator| !separator.is_empty())
        .find_map(|separator| {
            let idx = window.rfind(separator)?;
            let boundary = content_start + idx + separator.len();
            (boundary > content_start && boundary >= half_full).then_some(boundary)
        })
}

/// Byte ranges of whitespace-separated words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// At most `max_chars` leading characters of `text`, cut on a char boundary.
pub fn leading_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
