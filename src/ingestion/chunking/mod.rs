
use std::collections::VecDeque;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::loader::Segment;

/// A retrieval unit: a contiguous span of one segment's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text, trimmed of surrounding whitespace
    pub text: String,
    /// Document the chunk came from
    pub source: String,
    /// 1-based page number within the document
    pub page: u32,
    /// Position of this chunk across the whole document
    pub chunk_index: usize,
    /// Byte offset of `text` within the page text
    pub start_offset: usize,
}

/// Configuration for recursive character splitting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of the same page
    pub chunk_overlap: usize,
    /// Separators tried in order; an empty string splits between characters
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 150,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                " ".to_string(),
                String::new(),
            ],
        }
    }
}

/// Split page segments into overlapping chunks.
///
/// Output is deterministic for a given config. Chunk indices run across all
/// segments in order.
#[inline]
pub fn split_segments(segments: &[Segment], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for segment in segments {
        for range in split_text(&segment.text, config) {
            chunks.push(Chunk {
                text: segment.text[range.clone()].to_string(),
                source: segment.source.clone(),
                page: segment.page,
                chunk_index: chunks.len(),
                start_offset: range.start,
            });
        }
    }

    debug!(
        "Split {} segments into {} chunks (avg {} chars)",
        segments.len(),
        chunks.len(),
        chunks.iter().map(|c| c.text.chars().count()).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split a single text into byte ranges of non-empty, trimmed chunks
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<Range<usize>> {
    let splitter = Splitter { text, config };
    splitter.split(0..text.len(), &config.separators)
}

struct Splitter<'a> {
    text: &'a str,
    config: &'a ChunkingConfig,
}

impl Splitter<'_> {
    fn split(&self, range: Range<usize>, separators: &[String]) -> Vec<Range<usize>> {
        let span = &self.text[range.clone()];

        // Pick the first separator present in this span
        let mut separator = "";
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if span.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut finished = Vec::new();
        let mut pending = Vec::new();

        for piece in split_keeping_separator(span, separator, range.start) {
            if self.char_len(&piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                finished.extend(self.merge(&pending));
                pending.clear();
            }

            if remaining.is_empty() {
                // Atomic unit longer than the limit
                if let Some(trimmed) = self.trim(piece) {
                    finished.push(trimmed);
                }
            } else {
                finished.extend(self.split(piece, remaining));
            }
        }

        if !pending.is_empty() {
            finished.extend(self.merge(&pending));
        }

        finished
    }

    /// Greedily pack contiguous pieces up to `chunk_size`, carrying up to
    /// `chunk_overlap` characters of tail into the next chunk
    fn merge(&self, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut merged = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = self.char_len(piece);

            if total + len > self.config.chunk_size && !window.is_empty() {
                if let Some(chunk) = self.window_range(&window) {
                    merged.push(chunk);
                }

                while total > self.config.chunk_overlap
                    || (total + len > self.config.chunk_size && total > 0)
                {
                    let Some((_, front_len)) = window.pop_front() else {
                        break;
                    };
                    total -= front_len;
                }
            }

            window.push_back((piece.clone(), len));
            total += len;
        }

        if let Some(chunk) = self.window_range(&window) {
            merged.push(chunk);
        }

        merged
    }

    fn window_range(&self, window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
        let start = window.front()?.0.start;
        let end = window.back()?.0.end;
        self.trim(start..end)
    }

    fn trim(&self, range: Range<usize>) -> Option<Range<usize>> {
        let span = &self.text[range.clone()];
        let leading = span.len() - span.trim_start().len();
        let trailing = span.len() - span.trim_end().len();
        let trimmed = (range.start + leading)..(range.end - trailing);
        (!trimmed.is_empty()).then_some(trimmed)
    }

    fn char_len(&self, range: &Range<usize>) -> usize {
        self.text[range.clone()].chars().count()
    }
}

/// Split `span` on `separator`, attaching each separator to the piece that
/// follows it. Returned ranges are absolute (shifted by `base`) and never
/// empty. An empty separator splits between characters.
fn split_keeping_separator(span: &str, separator: &str, base: usize) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return span
            .char_indices()
            .map(|(i, c)| (base + i)..(base + i + c.len_utf8()))
            .collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in span.match_indices(separator) {
        if idx > last {
            pieces.push((base + last)..(base + idx));
        }
        last = idx;
    }
    if last < span.len() {
        pieces.push((base + last)..(base + span.len()));
    }

    pieces
}
