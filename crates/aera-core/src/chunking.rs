//! Sliding-window text chunking for embedding generation.
//!
//! Splits a document body into overlapping windows of at most `max_chars`
//! characters, preferring to end a window just after a period or newline
//! when one falls in the second half of the window.
//!
//! All positions are counted in characters, so multi-byte text is never cut
//! inside a code point.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// One chunk of a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Sequential index, starting at 0.
    pub id: usize,
    /// Trimmed window text.
    pub content: String,
    /// Character offset where the window starts (before trimming).
    pub start: usize,
    /// Character offset one past the window end (before trimming).
    pub end: usize,
}

/// Chunk `text` with the default size and overlap.
pub fn chunk_text_default(text: &str) -> Vec<DocumentChunk> {
    chunk_text(text, defaults::CHUNK_SIZE, defaults::CHUNK_OVERLAP)
}

/// Split `text` into overlapping chunks of at most `max_chars` characters.
///
/// Whitespace-only windows are dropped. The cursor always advances, even when
/// `overlap >= max_chars`.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<DocumentChunk> {
    let max_chars = max_chars.max(1);

    // Byte offset of every char position, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut pos = 0;

    while pos < len {
        let mut end = (pos + max_chars).min(len);

        if end < len {
            let min_break = pos + max_chars / 2;
            if let Some(idx) = (pos..end).rev().find(|&i| chars[i] == '.' || chars[i] == '\n') {
                if idx + 1 >= min_break {
                    end = idx + 1;
                }
            }
        }

        let content = text[bounds[pos]..bounds[end]].trim();
        if !content.is_empty() {
            chunks.push(DocumentChunk {
                id: chunks.len(),
                content: content.to_string(),
                start: pos,
                end,
            });
        }

        if end == len {
            break;
        }

        let next = end.saturating_sub(overlap);
        pos = if next <= pos { end } else { next };
    }

    chunks
}
