//! Greedy recursive text chunker.
//!
//! Splits the concatenated document text into overlapping [`Chunk`]s of at
//! most `chunk_size` characters. Each chunk ends on the coarsest boundary
//! available inside its window: paragraph (`\n\n`), then line (`\n`), then
//! sentence end, then word, and only then a raw character cut.
//!
//! Lengths are counted in Unicode scalar values, not bytes or tokens.
//!
//! # Overlap
//!
//! The next chunk starts at the last word start at or before
//! `end - chunk_overlap`, so the tail of chunk *i* (at least
//! `chunk_overlap` characters of it) is always a prefix of chunk *i + 1*.
//! The search for a word start looks back at most `2 × chunk_overlap`
//! characters before falling back to an exact character offset.
//!
//! Each chunk carries a SHA-256 hash of its text, which the index cache
//! uses to recognise a chunk set it has already embedded.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Boundary levels, coarsest first. Each entry is a pattern plus how many
/// of its characters stay in the chunk that ends there.
const BOUNDARY_LEVELS: &[&[(&str, usize)]] = &[
    &[("\n\n", 0)],
    &[("\n", 0)],
    &[(". ", 1), ("? ", 1), ("! ", 1)],
    &[(" ", 0)],
];

/// Split `text` into chunks using the configured size and overlap.
///
/// Returns an empty vector for empty or whitespace-only text. Spans that
/// fall entirely inside a long whitespace run are dropped. Indices are
/// contiguous from 0.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    split_spans(&chars, config.chunk_size, config.chunk_overlap)
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .enumerate()
        .map(|(index, piece)| make_chunk(index, piece))
        .collect()
}

/// Compute `[start, end)` character spans for every chunk.
fn split_spans(chars: &[char], size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    if size == 0 {
        return spans;
    }
    let overlap = overlap.min(size - 1);

    let Some(first) = chars.iter().position(|c| !c.is_whitespace()) else {
        return spans;
    };
    let last = chars
        .iter()
        .rposition(|c| !c.is_whitespace())
        .map_or(chars.len(), |i| i + 1);

    let mut start = first;
    let mut min_end = first + overlap + 1;
    loop {
        if last - start <= size {
            spans.push((start, last));
            break;
        }
        let end = find_cut(chars, start, start + size, min_end);
        spans.push((start, end));
        start = next_start(chars, start, end, size, overlap);
        min_end = end + 1;
    }

    spans
}

/// Choose where the chunk beginning at `start` ends.
///
/// The end lies in `[min_end, hi]`; `min_end` guarantees both progress and
/// that a chunk never ends before its predecessor.
fn find_cut(chars: &[char], start: usize, hi: usize, min_end: usize) -> usize {
    for level in BOUNDARY_LEVELS {
        let best = level
            .iter()
            .filter_map(|(pattern, keep)| last_boundary(chars, start, hi, min_end, pattern, *keep))
            .max();
        if let Some(end) = best {
            return end;
        }
    }

    let trimmed = trim_end(chars, start, hi);
    if trimmed >= min_end {
        trimmed
    } else {
        hi
    }
}

/// Last occurrence of `pattern` whose cut point, after trimming trailing
/// whitespace, falls in `[min_end, hi]`.
fn last_boundary(
    chars: &[char],
    start: usize,
    hi: usize,
    min_end: usize,
    pattern: &str,
    keep: usize,
) -> Option<usize> {
    let pat: Vec<char> = pattern.chars().collect();
    if chars.len() < pat.len() || hi < keep {
        return None;
    }
    let upper = (hi - keep).min(chars.len() - pat.len());

    for q in (start..=upper).rev() {
        let cut = q + keep;
        if cut < min_end {
            return None;
        }
        if chars[q..q + pat.len()] == pat[..] {
            let end = trim_end(chars, start, cut);
            return (end >= min_end).then_some(end);
        }
    }
    None
}

fn trim_end(chars: &[char], start: usize, mut end: usize) -> usize {
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    end
}

fn is_word_start(chars: &[char], p: usize) -> bool {
    !chars[p].is_whitespace() && (p == 0 || chars[p - 1].is_whitespace())
}

/// Where the chunk after `[start, end)` begins.
fn next_start(chars: &[char], start: usize, end: usize, size: usize, overlap: usize) -> usize {
    let target = end - overlap;
    let floor = (start + 1)
        .max(end.saturating_sub(2 * overlap))
        .max((end + 1).saturating_sub(size));

    if let Some(p) = (floor..=target).rev().find(|&p| is_word_start(chars, p)) {
        return p;
    }

    if overlap == 0 {
        let mut p = target;
        while p < chars.len() && chars[p].is_whitespace() {
            p += 1;
        }
        p
    } else {
        target
    }
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(index: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        index,
        text,
        hash,
    }
}
