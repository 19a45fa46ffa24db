//! Deterministic sentence/paragraph-aware chunk splitting.
//!
//! The splitting rule: paragraphs are separated by a double newline;
//! within a paragraph, Unicode sentence boundaries (UAX #29) delimit
//! sentences; sentences are packed greedily into chunks up to the target
//! size in bytes. A sentence longer than the target is hard-split at char
//! boundaries. Identical input always yields identical chunk boundaries,
//! which is what keeps persisted vector indices aligned with freshly
//! split chunks across runs.

use unicode_segmentation::UnicodeSegmentation;

use super::chunk::Chunk;

/// Default target chunk size in bytes.
pub const DEFAULT_CHUNK_TARGET: usize = 1024;

/// Floor for the target size; below this, packing degenerates into
/// per-sentence fragments and hard splits of multi-byte chars.
const MIN_CHUNK_TARGET: usize = 64;

/// Deterministic splitter producing [`Chunk`]s from document text.
#[derive(Debug, Clone, Copy)]
pub struct SentenceSplitter {
    target_size: usize,
}

impl SentenceSplitter {
    /// Creates a splitter with the given target chunk size in bytes.
    ///
    /// Values below an internal floor are clamped up.
    #[must_use]
    pub const fn new(target_size: usize) -> Self {
        let clamped = if target_size < MIN_CHUNK_TARGET {
            MIN_CHUNK_TARGET
        } else {
            target_size
        };
        Self {
            target_size: clamped,
        }
    }

    /// The effective target chunk size in bytes.
    #[must_use]
    pub const fn target_size(&self) -> usize {
        self.target_size
    }

    /// Splits `text` into ordered chunks attributed to `doc_key`.
    ///
    /// Returns an empty vec for whitespace-only input. Every produced
    /// chunk is non-empty after trimming and at most `target_size` bytes.
    #[must_use]
    pub fn split(&self, doc_key: &str, text: &str) -> Vec<Chunk> {
        let normalized = text.replace("\r\n", "\n");
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut buffer = String::new();

        for paragraph in normalized.split("\n\n") {
            let mut at_paragraph_start = true;

            for sentence in paragraph.split_sentence_bounds() {
                if sentence.len() > self.target_size {
                    Self::flush(doc_key, &mut buffer, &mut chunks);
                    for piece in hard_split(sentence, self.target_size) {
                        Self::emit(doc_key, piece, &mut chunks);
                    }
                    at_paragraph_start = false;
                    continue;
                }

                let separator = if buffer.is_empty() || !at_paragraph_start {
                    ""
                } else {
                    "\n\n"
                };

                if !buffer.is_empty()
                    && buffer.len() + separator.len() + sentence.len() > self.target_size
                {
                    Self::flush(doc_key, &mut buffer, &mut chunks);
                    buffer.push_str(sentence);
                } else {
                    buffer.push_str(separator);
                    buffer.push_str(sentence);
                }
                at_paragraph_start = false;
            }
        }

        Self::flush(doc_key, &mut buffer, &mut chunks);
        chunks
    }

    fn flush(doc_key: &str, buffer: &mut String, chunks: &mut Vec<Chunk>) {
        Self::emit(doc_key, buffer, chunks);
        buffer.clear();
    }

    fn emit(doc_key: &str, text: &str, chunks: &mut Vec<Chunk>) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk::new(doc_key, chunks.len(), trimmed));
        }
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_TARGET)
    }
}

/// Splits an oversize sentence into pieces of at most `max` bytes,
/// breaking only at char boundaries.
fn hard_split(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut end = 0usize;

    for (idx, ch) in text.char_indices() {
        let ch_end = idx + ch.len_utf8();
        if ch_end - start > max {
            pieces.push(&text[start..idx]);
            start = idx;
        }
        end = ch_end;
    }
    if start < end {
        pieces.push(&text[start..end]);
    }
    pieces
}
