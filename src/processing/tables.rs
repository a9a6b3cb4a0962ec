//! Markdown table detection and splitter boundary markers.

use regex::Regex;
use std::sync::LazyLock;

/// Marker inserted before a detected table.
pub const TABLE_START: &str = "[TABLE_START]";
/// Marker inserted after a detected table.
pub const TABLE_END: &str = "[TABLE_END]";

// Header row, separator row, then one or more data rows.
static TABLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*\|.*\|[ \t]*\r?\n[ \t]*\|(?:[ \t]*:?-+:?[ \t]*\|)+[ \t]*\r?\n(?:[ \t]*\|.*\|[ \t]*(?:\r?\n|$))+",
    )
    .expect("table block pattern compiles")
});

/// A table found in raw text. `start..end` is a byte range excluding the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    /// Table source text.
    pub content: String,
    /// Byte offset of the header row.
    pub start: usize,
    /// Byte offset just past the last data row.
    pub end: usize,
}

/// Every well-formed markdown table in `text`, in document order.
pub fn extract_tables(text: &str) -> Vec<TableBlock> {
    TABLE_BLOCK
        .find_iter(text)
        .map(|found| {
            let content = found.as_str().trim_end_matches(['\r', '\n']);
            TableBlock {
                content: content.to_string(),
                start: found.start(),
                end: found.start() + content.len(),
            }
        })
        .collect()
}

/// Wrap every table in start/end markers so the splitter treats it as one unit.
pub fn mark_table_boundaries(text: &str) -> String {
    let tables = extract_tables(text);
    if tables.is_empty() {
        return text.to_string();
    }

    let mut marked = text.to_string();
    // Later edits first, so earlier offsets stay valid.
    for table in tables.iter().rev() {
        let wrapped = format!("{TABLE_START}\n{}\n{TABLE_END}", table.content);
        marked.replace_range(table.start..table.end, &wrapped);
    }
    tracing::debug!(tables = tables.len(), "Marked table boundaries");
    marked
}

/// Remove splitter markers; they are hints, not content.
pub fn strip_table_markers(text: &str) -> String {
    text.replace(&format!("{TABLE_START}\n"), "")
        .replace(&format!("\n{TABLE_END}"), "")
        .replace(TABLE_START, "")
        .replace(TABLE_END, "")
}
