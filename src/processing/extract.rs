//! Format-specific text extraction.

use super::types::{DocumentError, FileFormat};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::panic;
use std::path::Path;
use std::sync::LazyLock;

/// Files above this size are rejected before extraction.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const DOCUMENT_XML: &str = "word/document.xml";

/// Pulls plain text out of a source file.
///
/// Implementations return zero or more text fragments; the processor joins them with blank
/// lines. [`DocumentError::UnsupportedFormat`] means "skip this file", not a failure.
pub trait TextExtractor: Send + Sync {
    /// Extract text fragments from `path`, which was classified as `format`.
    fn extract(&self, path: &Path, format: FileFormat) -> Result<Vec<String>, DocumentError>;
}

/// Extractor covering every supported format.
#[derive(Debug, Clone)]
pub struct DefaultExtractor {
    max_file_size: u64,
}

impl Default for DefaultExtractor {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl DefaultExtractor {
    /// Extractor with a custom size limit.
    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    fn check_size(&self, path: &Path) -> Result<(), DocumentError> {
        let size = std::fs::metadata(path)
            .map_err(|error| DocumentError::io(path, error))?
            .len();
        if size > self.max_file_size {
            return Err(DocumentError::FileTooLarge(size));
        }
        Ok(())
    }
}

impl TextExtractor for DefaultExtractor {
    fn extract(&self, path: &Path, format: FileFormat) -> Result<Vec<String>, DocumentError> {
        self.check_size(path)?;
        let text = match format {
            FileFormat::Word => read_docx(path)?,
            FileFormat::Markdown => {
                std::fs::read_to_string(path).map_err(|error| DocumentError::io(path, error))?
            }
            FileFormat::Pdf => read_pdf(path)?,
        };
        Ok(vec![text])
    }
}

/// pdf-extract panics on some malformed font dictionaries; the panic is reported as a
/// [`DocumentError::Pdf`] so one bad file cannot take the run down.
fn read_pdf(path: &Path) -> Result<String, DocumentError> {
    panic::catch_unwind(|| pdf_extract::extract_text(path))
        .map_err(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|message| (*message).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(path = %path.display(), reason = %reason, "PDF parser panicked");
            DocumentError::Pdf(format!("parser panicked: {reason}"))
        })?
        .map_err(|error| DocumentError::Pdf(error.to_string()))
}

fn read_docx(path: &Path) -> Result<String, DocumentError> {
    let file = File::open(path).map_err(|error| DocumentError::io(path, error))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive.by_name(DOCUMENT_XML)?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|error| DocumentError::io(path, error))?;
    Ok(docx_xml_to_text(&xml))
}

static TAB_STOPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:tabs\b[^>]*>.*?</w:tabs>").expect("tab stop pattern compiles")
});
static BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:(?:br|cr)\b[^>]*/>").expect("break pattern compiles"));
static TAB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:tab\b[^>]*/>").expect("tab pattern compiles"));
static PARAGRAPH_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</w:p>").expect("paragraph pattern compiles"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern compiles"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern compiles"));

/// Convert WordprocessingML body XML into plain text.
///
/// Paragraphs end with a blank line. Tables become pipe-delimited rows with a separator after
/// the first row, so downstream table detection sees them.
pub(crate) fn docx_xml_to_text(xml: &str) -> String {
    let xml = TAB_STOPS.replace_all(xml, "");
    let mut with_tables = String::with_capacity(xml.len());
    let mut copied = 0;
    for table in outermost_elements(&xml, "tbl") {
        with_tables.push_str(&xml[copied..table.start]);
        with_tables.push_str("\n\n");
        with_tables.push_str(&table_to_markdown(&xml[table.clone()]));
        with_tables.push_str("\n\n");
        copied = table.end;
    }
    with_tables.push_str(&xml[copied..]);
    let text = TAB.replace_all(&with_tables, "\t");
    let text = BREAK.replace_all(&text, "\n");
    let text = PARAGRAPH_END.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    BLANK_RUNS.replace_all(text.trim(), "\n\n").into_owned()
}

/// Byte ranges of the outermost `<w:{tag}>` elements. Closing tags are paired by depth, so
/// tables nested inside cells stay within their parent.
fn outermost_elements(xml: &str, tag: &str) -> Vec<Range<usize>> {
    let open = format!("<w:{tag}");
    let close = format!("</w:{tag}>");
    let mut ranges = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut cursor = 0;
    loop {
        let rest = &xml[cursor..];
        let next_open = find_open_tag(rest, &open);
        match (next_open, rest.find(&close)) {
            (Some(opened), Some(closed)) if opened < closed => {
                if depth == 0 {
                    start = cursor + opened;
                }
                depth += 1;
                cursor += opened + open.len();
            }
            (_, Some(closed)) => {
                cursor += closed + close.len();
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        ranges.push(start..cursor);
                    }
                }
            }
            _ => break,
        }
    }
    ranges
}

/// `<w:tbl` must not match `<w:tblPr`.
fn find_open_tag(haystack: &str, open: &str) -> Option<usize> {
    haystack.match_indices(open).map(|(index, _)| index).find(|index| {
        matches!(
            haystack.as_bytes().get(index + open.len()),
            Some(b' ' | b'>' | b'\t' | b'\n' | b'\r')
        )
    })
}

fn table_to_markdown(table_xml: &str) -> String {
    let rows: Vec<String> = outermost_elements(table_xml, "tr")
        .into_iter()
        .map(|row| {
            let row_xml = &table_xml[row];
            let cells: Vec<String> = outermost_elements(row_xml, "tc")
                .into_iter()
                .map(|cell| cell_text(&row_xml[cell]))
                .collect();
            format!("| {} |", cells.join(" | "))
        })
        .collect();

    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns = first.matches(" | ").count() + 1;
    let separator = format!("|{}", "---|".repeat(columns));
    let mut lines = vec![first.clone(), separator];
    lines.extend(rows.iter().skip(1).cloned());
    lines.join("\n")
}

fn cell_text(cell_xml: &str) -> String {
    let spaced = PARAGRAPH_END.replace_all(cell_xml, " ");
    let text = TAG.replace_all(&spaced, "");
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "/")
}

fn decode_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate.find(';').and_then(|end| {
            decode_entity(&candidate[1..end]).map(|ch| (ch, end + 1))
        }) {
            Some((ch, consumed)) => {
                decoded.push(ch);
                rest = &candidate[consumed..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or(name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn paragraph(text: &str) -> String {
        format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    #[test]
    fn paragraphs_become_blank_line_separated() {
        let xml = format!(
            "<w:document><w:body>{}{}</w:body></w:document>",
            paragraph("## SECTION 1: Start"),
            paragraph("Fish &amp; chips &#8212; &#x41;")
        );
        assert_eq!(
            docx_xml_to_text(&xml),
            "## SECTION 1: Start\n\nFish & chips \u{2014} A"
        );
    }

    #[test]
    fn tables_become_markdown_rows() {
        let cell = |text: &str| format!("<w:tc><w:tcPr/>{}</w:tc>", paragraph(text));
        let row = |a: &str, b: &str| format!("<w:tr>{}{}</w:tr>", cell(a), cell(b));
        let xml = format!(
            "<w:body>{}<w:tbl>{}{}</w:tbl>{}</w:body>",
            paragraph("Before"),
            row("Metric", "Target"),
            row("Time", "4T"),
            paragraph("After")
        );
        let text = docx_xml_to_text(&xml);
        assert!(
            text.contains("| Metric | Target |\n|---|---|\n| Time | 4T |"),
            "{text}"
        );
        assert!(text.starts_with("Before"));
        assert!(text.ends_with("After"));
    }

    #[test]
    fn nested_tables_stay_inside_their_cell() {
        let cell = |inner: &str| format!("<w:tc>{inner}</w:tc>");
        let inner_table = format!(
            "<w:tbl><w:tblPr/><w:tr>{}{}</w:tr></w:tbl>",
            cell(&paragraph("a")),
            cell(&paragraph("b"))
        );
        let xml = format!(
            "<w:body><w:tbl><w:tblPr/><w:tr>{}{}</w:tr><w:tr>{}{}</w:tr></w:tbl>{}</w:body>",
            cell(&paragraph("Plan")),
            cell(&paragraph("Detail")),
            cell(&paragraph("Q1")),
            cell(&inner_table),
            paragraph("After")
        );
        let text = docx_xml_to_text(&xml);
        assert!(
            text.contains("| Plan | Detail |\n|---|---|\n| Q1 | a b |"),
            "{text}"
        );
        assert_eq!(text.matches("|---|").count(), 1, "{text}");
        assert!(text.ends_with("After"));
    }

    #[test]
    fn tab_stop_definitions_are_not_text() {
        let xml = concat!(
            "<w:p><w:pPr><w:tabs><w:tab w:val=\"left\" w:pos=\"720\"/></w:tabs></w:pPr>",
            "<w:r><w:t>Name</w:t></w:r><w:r><w:tab/><w:t>Role</w:t></w:r></w:p>"
        );
        assert_eq!(docx_xml_to_text(xml), "Name\tRole");
    }

    #[test]
    fn malformed_pdf_font_is_a_pdf_error() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/broken_type3_font.pdf");
        let error = DefaultExtractor::default()
            .extract(&fixture, FileFormat::Pdf)
            .expect_err("malformed font");
        assert!(matches!(error, DocumentError::Pdf(_)), "{error:?}");
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(decode_entities("a &bogus; b & c"), "a &bogus; b & c");
    }

    #[test]
    fn markdown_is_read_verbatim() {
        let mut file = tempfile::Builder::new()
            .suffix(".md")
            .tempfile()
            .expect("temp file");
        write!(file, "# Title\n\nBody").expect("write");
        let fragments = DefaultExtractor::default()
            .extract(file.path(), FileFormat::Markdown)
            .expect("extract");
        assert_eq!(fragments, vec!["# Title\n\nBody".to_string()]);
    }

    #[test]
    fn oversized_files_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&[b'x'; 64]).expect("write");
        let error = DefaultExtractor::with_max_file_size(16)
            .extract(file.path(), FileFormat::Markdown)
            .expect_err("too large");
        assert!(matches!(error, DocumentError::FileTooLarge(64)));
    }

    #[test]
    fn corrupt_docx_is_an_archive_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"not a zip").expect("write");
        let error = DefaultExtractor::default()
            .extract(file.path(), FileFormat::Word)
            .expect_err("corrupt");
        assert!(matches!(error, DocumentError::Archive(_)));
    }
}
