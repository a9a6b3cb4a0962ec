//! Best-effort resolution of the section headings that precede a chunk.

use super::types::SectionInfo;
use regex::Regex;
use std::sync::LazyLock;

const PREFIX_CHARS: usize = 100;

static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:##[ \t]*)?SECTION[ \t]+(\d+):[ \t]*([^\n]+)")
        .expect("section heading pattern compiles")
});

static SUBSECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"###[ \t]+([^\n]+)").expect("subsection heading pattern compiles")
});

/// Resolve headings for a chunk.
///
/// The chunk is located by searching for its first hundred characters: the raw splitter output
/// in the marked text first, then the marker-stripped body in the original text. A chunk that
/// cannot be located gets no section information.
///
/// The heading scan deliberately runs past the chunk's start offset to the end of its first
/// line. The splitter keeps separators at the start of the next piece, so a chunk opening with
/// `## SECTION 2` is labeled section 2 here, where a scan stopping at the offset would label it
/// with the previous section.
pub fn resolve_section(marked: &str, original: &str, raw_chunk: &str, body: &str) -> SectionInfo {
    locate(marked, raw_chunk)
        .map(|end| scan(&marked[..end]))
        .or_else(|| locate(original, body).map(|end| scan(&original[..end])))
        .unwrap_or_default()
}

/// Offset just past the first line of the located chunk.
fn locate(haystack: &str, chunk: &str) -> Option<usize> {
    let prefix = prefix_chars(chunk, PREFIX_CHARS);
    if prefix.is_empty() {
        return None;
    }
    let start = haystack.find(prefix)?;
    let first_line = prefix.find('\n').unwrap_or(prefix.len());
    Some(start + first_line)
}

fn prefix_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn scan(preceding: &str) -> SectionInfo {
    let mut info = SectionInfo::default();
    if let Some(captures) = SECTION_HEADING.captures_iter(preceding).last() {
        info.section_number = captures
            .get(1)
            .and_then(|digits| digits.as_str().parse().ok());
        info.section_title = captures
            .get(2)
            .map(|title| title.as_str().trim().to_string())
            .filter(|title| !title.is_empty());
    }
    info.subsection = SUBSECTION_HEADING
        .captures_iter(preceding)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|heading| heading.as_str().trim().to_string())
        .filter(|heading| !heading.is_empty());
    info
}
