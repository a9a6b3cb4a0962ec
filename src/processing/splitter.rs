//! Recursive character splitter with table-aware separators.
//!
//! Text is split on the first separator in the priority list that occurs in a segment. The
//! separator stays at the start of the piece that follows it. Pieces under the size limit are
//! merged greedily with a trailing overlap; oversized pieces recurse with the remaining
//! separators. Spans between [`TABLE_START`] and [`TABLE_END`] are never cut strictly inside,
//! even at character level, so a table longer than the limit becomes one oversized chunk.
//!
//! Sizes are measured in characters, not bytes.

use super::tables::{TABLE_END, TABLE_START};
use std::collections::VecDeque;
use std::ops::Range;

/// Separator priority: section headings, subsection headings, bold headings, table starts,
/// paragraphs, lines, sentences, words, characters.
pub const SEPARATORS: &[&str] = &[
    "\n\n## SECTION",
    "\n\n### ",
    "\n\n**",
    TABLE_START,
    "\n\n",
    "\n",
    ". ",
    " ",
    "",
];

/// Size limit and overlap for one splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Target upper bound per chunk, in characters.
    pub chunk_size: usize,
    /// Characters of trailing context carried into the next chunk.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 300,
        }
    }
}

impl SplitterConfig {
    /// Settings used for documents that contain tables.
    pub fn table_default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 400,
        }
    }
}

/// Splits text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    /// Build a splitter; a zero size is raised to one and overlap is kept below the size.
    pub fn new(config: SplitterConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let chunk_overlap = config.chunk_overlap.min(chunk_size - 1);
        Self {
            config: SplitterConfig {
                chunk_size,
                chunk_overlap,
            },
        }
    }

    /// Effective settings.
    pub fn config(&self) -> SplitterConfig {
        self.config
    }

    /// Split `text` into trimmed, non-empty chunks in document order.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_ranges(text)
            .into_iter()
            .map(|range| text[range].to_string())
            .collect()
    }

    /// Byte ranges of every chunk within `text`, already trimmed of surrounding whitespace.
    pub fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let protected = protected_spans(text);
        let mut chunks = Vec::new();
        self.split_segment(text, 0..text.len(), SEPARATORS, &protected, &mut chunks);
        chunks
    }

    fn split_segment(
        &self,
        text: &str,
        segment: Range<usize>,
        separators: &[&str],
        protected: &[Range<usize>],
        out: &mut Vec<Range<usize>>,
    ) {
        let chosen = separators
            .iter()
            .position(|separator| {
                separator.is_empty()
                    || !cut_points(text, &segment, separator, protected).is_empty()
            })
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(chosen).copied().unwrap_or("");
        let remaining = separators.get(chosen + 1..).unwrap_or(&[]);

        let mut pending: Vec<Range<usize>> = Vec::new();
        for piece in pieces(text, &segment, separator, protected) {
            if char_len(text, &piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                self.merge(text, &pending, out);
                pending.clear();
            }
            if remaining.is_empty() {
                push_trimmed(text, piece, out);
            } else {
                self.split_segment(text, piece, remaining, protected, out);
            }
        }
        if !pending.is_empty() {
            self.merge(text, &pending, out);
        }
    }

    // Pieces are contiguous, so a window of them is a single slice of the original text.
    fn merge(&self, text: &str, pieces: &[Range<usize>], out: &mut Vec<Range<usize>>) {
        let SplitterConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let length = char_len(text, piece);
            if total + length > chunk_size && !window.is_empty() {
                if total > chunk_size {
                    tracing::trace!(total, chunk_size, "Emitting chunk above the size limit");
                }
                push_window(text, &window, out);
                while total > chunk_overlap || (total + length > chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece.clone(), length));
            total += length;
        }
        push_window(text, &window, out);
    }
}

fn push_window(text: &str, window: &VecDeque<(Range<usize>, usize)>, out: &mut Vec<Range<usize>>) {
    if let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) {
        push_trimmed(text, first.start..last.end, out);
    }
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading + trailing < slice.len() {
        out.push(range.start + leading..range.end - trailing);
    }
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

/// Byte spans from each table start marker through the matching end marker.
/// An unterminated table is protected to the end of the text.
fn protected_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find(TABLE_START) {
        let start = cursor + found;
        let body = start + TABLE_START.len();
        let end = text[body..]
            .find(TABLE_END)
            .map(|offset| body + offset + TABLE_END.len())
            .unwrap_or(text.len());
        spans.push(start..end);
        cursor = end;
    }
    spans
}

fn strictly_inside(position: usize, protected: &[Range<usize>]) -> bool {
    protected
        .iter()
        .any(|span| span.start < position && position < span.end)
}

/// Unprotected separator offsets inside `segment`, excluding its first byte.
fn cut_points(
    text: &str,
    segment: &Range<usize>,
    separator: &str,
    protected: &[Range<usize>],
) -> Vec<usize> {
    text[segment.clone()]
        .match_indices(separator)
        .map(|(offset, _)| segment.start + offset)
        .filter(|position| *position > segment.start && !strictly_inside(*position, protected))
        .collect()
}

fn pieces(
    text: &str,
    segment: &Range<usize>,
    separator: &str,
    protected: &[Range<usize>],
) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return character_pieces(text, segment, protected);
    }

    let mut result = Vec::new();
    let mut start = segment.start;
    for cut in cut_points(text, segment, separator, protected) {
        result.push(start..cut);
        start = cut;
    }
    if start < segment.end {
        result.push(start..segment.end);
    }
    result
}

// Every character is its own piece except protected spans, which stay whole.
fn character_pieces(
    text: &str,
    segment: &Range<usize>,
    protected: &[Range<usize>],
) -> Vec<Range<usize>> {
    let mut result = Vec::new();
    let mut position = segment.start;
    while position < segment.end {
        let end = match protected.iter().find(|span| span.start == position) {
            Some(span) => span.end.min(segment.end),
            None => text[position..]
                .chars()
                .next()
                .map(|ch| position + ch.len_utf8())
                .unwrap_or(segment.end),
        };
        result.push(position..end);
        position = end;
    }
    result
}
