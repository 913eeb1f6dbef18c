//! Line-aligned, overlapping text chunker.
//!
//! Splits a note into [`TextChunk`]s of roughly `target_tokens` words. A line
//! is never split: lines accumulate until the next one would push the chunk
//! past the target, then the chunk is emitted and the next one starts with a
//! tail of the previous chunk's lines worth at most `overlap_tokens` words.
//!
//! A "token" here is a whitespace-delimited word. That is a coarse stand-in
//! for model tokens but it is stable, cheap and independent of the provider.
//!
//! Every chunk's `content` is exactly its source lines joined with `\n`, so
//! `line_start..=line_end` of the original text reproduces it.

use sha2::{Digest, Sha256};

use crate::models::TextChunk;

/// Split `text` into overlapping, line-aligned chunks.
///
/// Empty or whitespace-only input yields no chunks. Leading and trailing
/// blank lines are trimmed from every chunk.
pub fn chunk_text(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = text.lines().collect();
    let word_counts: Vec<usize> = lines.iter().map(|l| l.split_whitespace().count()).collect();

    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut start = 0usize;
    let mut words = 0usize;

    for i in 0..lines.len() {
        let w = word_counts[i];
        if words > 0 && words + w > target_tokens {
            push_chunk(&mut chunks, &lines, start, i);

            // Walk back from the end of the emitted chunk, never reusing all of it.
            let mut next_start = i;
            let mut tail = 0usize;
            while next_start > start + 1 {
                let wc = word_counts[next_start - 1];
                if tail + wc > overlap_tokens {
                    break;
                }
                tail += wc;
                next_start -= 1;
            }
            start = next_start;
            words = tail;
        }
        words += w;
    }

    if start < lines.len() {
        push_chunk(&mut chunks, &lines, start, lines.len());
    }

    chunks
}

/// Emit lines `start..end` (0-based, exclusive end) after trimming blank
/// edges. Skips the chunk if nothing new remains.
fn push_chunk(chunks: &mut Vec<TextChunk>, lines: &[&str], start: usize, end: usize) {
    let is_blank = |idx: usize| lines[idx].trim().is_empty();

    let mut s = start;
    let mut e = end;
    while s < e && is_blank(s) {
        s += 1;
    }
    while e > s && is_blank(e - 1) {
        e -= 1;
    }
    if s == e {
        return;
    }

    let line_start = s + 1;
    let line_end = e;
    if let Some(prev) = chunks.last() {
        if prev.line_end >= line_end {
            return;
        }
    }

    let content = lines[s..e].join("\n");
    let content_hash = content_hash(&content);
    chunks.push(TextChunk {
        content,
        line_start,
        line_end,
        content_hash,
    });
}

/// SHA-256 hex digest of a chunk's content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
