//! Word-window chunker and chunk quality filter.
//!
//! Offsets are measured in characters of the cleaned text and are exact:
//! downstream consumers slice the stored content with them, so the chunker
//! records the position of the first and last word of every window rather
//! than re-deriving them.

use serde::Serialize;

use crate::clean::NAV_KEYWORDS;
use crate::constants::{
    CHUNK_OVERLAP_WORDS, CHUNK_SIZE_WORDS, MIN_CHUNK_WORDS, SAFETY_FLOOR_CHUNKS,
};
use crate::types::Chunk;

/// A word span inside the cleaned text, in both byte and char coordinates.
#[derive(Debug, Clone, Copy)]
struct WordSpan {
    byte_start: usize,
    byte_end: usize,
    char_start: usize,
    char_end: usize,
}

fn word_spans(text: &str) -> Vec<WordSpan> {
    let mut spans = Vec::new();
    let mut current: Option<WordSpan> = None;
    let mut char_idx = 0usize;
    for (byte_idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(span) = current.take() {
                spans.push(span);
            }
        } else {
            match current.as_mut() {
                Some(span) => {
                    span.byte_end = byte_idx + ch.len_utf8();
                    span.char_end = char_idx + 1;
                }
                None => {
                    current = Some(WordSpan {
                        byte_start: byte_idx,
                        byte_end: byte_idx + ch.len_utf8(),
                        char_start: char_idx,
                        char_end: char_idx + 1,
                    });
                }
            }
        }
        char_idx += 1;
    }
    if let Some(span) = current.take() {
        spans.push(span);
    }
    spans
}

/// Split cleaned text into overlapping word windows.
///
/// Windows hold `chunk_size` words and successive windows share `overlap`
/// words; the final window may be shorter. Empty input yields no chunks.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    assert!(chunk_size > overlap, "chunk_size must exceed overlap");
    let words = word_spans(text);
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;
    loop {
        let end = usize::min(start + chunk_size, words.len());
        let first = words[start];
        let last = words[end - 1];
        chunks.push(Chunk {
            index,
            text: text[first.byte_start..last.byte_end].to_string(),
            char_start: first.char_start,
            char_end: last.char_end,
            word_count: end - start,
        });
        if end == words.len() {
            break;
        }
        start = end - overlap;
        index += 1;
    }
    chunks
}

/// Split with the standard window geometry.
pub fn split_default(text: &str) -> Vec<Chunk> {
    split(text, CHUNK_SIZE_WORDS, CHUNK_OVERLAP_WORDS)
}

/// Why a chunk was dropped, for the filter report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    Navigation,
    LinkHeavy,
    TooShort,
}

/// Filter outcome: the kept chunks plus drop accounting.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub kept: Vec<Chunk>,
    pub dropped: Vec<(usize, DropReason)>,
    pub safety_floor_applied: bool,
}

fn nav_occurrences(lower: &str) -> usize {
    NAV_KEYWORDS.iter().map(|kw| lower.matches(kw).count()).sum()
}

fn classify(chunk: &Chunk) -> Option<DropReason> {
    if chunk.word_count < MIN_CHUNK_WORDS {
        return Some(DropReason::TooShort);
    }
    let lower = chunk.text.to_lowercase();
    if nav_occurrences(&lower) >= 3 {
        return Some(DropReason::Navigation);
    }
    let open_brackets = chunk.text.matches('[').count();
    let link_markers = open_brackets + chunk.text.matches("](").count();
    if link_markers as f32 / chunk.word_count as f32 > 0.3 {
        return Some(DropReason::LinkHeavy);
    }
    if open_brackets > chunk.word_count / 3 {
        return Some(DropReason::LinkHeavy);
    }
    None
}

/// Drop navigation-heavy, link-heavy, and too-short windows.
///
/// If every chunk would be dropped but the input sequence is non-empty, the
/// first three raw chunks are kept instead so short or link-dense pages stay
/// searchable.
pub fn filter(chunks: Vec<Chunk>) -> FilterOutcome {
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for chunk in &chunks {
        match classify(chunk) {
            Some(reason) => dropped.push((chunk.index, reason)),
            None => kept.push(chunk.clone()),
        }
    }

    if kept.is_empty() && !chunks.is_empty() {
        let kept: Vec<Chunk> = chunks.into_iter().take(SAFETY_FLOOR_CHUNKS).collect();
        return FilterOutcome {
            kept,
            dropped,
            safety_floor_applied: true,
        };
    }

    FilterOutcome {
        kept,
        dropped,
        safety_floor_applied: false,
    }
}
