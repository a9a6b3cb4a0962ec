//! Path- and content-based metadata inference for course documents.
//!
//! Every function here is total: when no pattern matches the result is an explicit `None`,
//! the default tag, or an empty set. Nothing in this module touches the filesystem.

mod rules;

use crate::processing::SourceFile;
use regex::Regex;
use rules::{
    CONTENT_TYPE_RULES, DEFAULT_CONTENT_TYPE, FACILITATOR_DENYLIST, FLAG_RULES, FOLDER_CATEGORIES,
    FlagScope, SESSION_TITLES,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

const KNOWN_EXTENSIONS: &[&str] = &[".docx", ".markdown", ".md", ".pdf"];

static YOUTUBE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)(?:https?://)?(?:www\.|m\.)?(?:youtube\.com/(?:watch\?(?:[^\s&#]*&)*v=|embed/|shorts/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})",
        r"(?i)(?:youtube|utube|video|link|url)\s*(?:url)?\s*[:=-]\s*(?:https?://)?(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]{11})",
    ])
});

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"'\)\]|]+"#).expect("URL pattern compiles")
});

static SESSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)session\s*[-_#:.]?\s*(\d+)",
        r"(?i)session\s+(?:no\.?|number)\s*(\d+)",
        r"(?i)\bsess\.?\s*(\d+)",
    ])
});

static FACILITATOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\bby\s+([A-Z][a-zA-Z\s]+?)(?:\.|$)",
        r"-\s*([A-Z][a-zA-Z\s]+?)\.(?i:docx|markdown|md|pdf)$",
        r"Showcase\s*-\s*([A-Z][a-zA-Z\s]+)",
    ])
});

static TABLE_ROW_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\|.*\|[ \t\r]*$").expect("table row pattern compiles"));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("metadata pattern compiles"))
        .collect()
}

/// Everything inferred about one source file. Derived once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMetadata {
    /// Session number found in the path.
    pub session_number: Option<u32>,
    /// Facilitator name found in the filename.
    pub facilitator: Option<String>,
    /// Content-type tag from the keyword rules.
    pub content_type: String,
    /// Curated or filename-derived session title.
    pub session_title: String,
    /// Coarse grouping (`community`, `revision`, `session_<n>`, `general`).
    pub category: String,
    /// Special-category flags keyed by metadata name.
    pub flags: BTreeMap<&'static str, bool>,
    /// Canonical YouTube watch URLs found in the text.
    pub youtube_urls: BTreeSet<String>,
    /// Other http(s) links found in the text.
    pub resource_urls: BTreeSet<String>,
    /// Whether the text contains pipe-delimited table rows.
    pub contains_tables: bool,
}

/// Derive all metadata for `file` from its path and extracted text.
pub fn extract_metadata(file: &SourceFile, text: &str) -> ExtractedMetadata {
    let path = file.relative_path();
    let session_number = extract_session_number(path);
    let youtube_urls = extract_youtube_urls(text);
    let resource_urls = extract_urls(text)
        .into_iter()
        .filter(|url| !is_youtube_url(url))
        .collect();

    ExtractedMetadata {
        session_number,
        facilitator: extract_facilitator(file.file_name()),
        content_type: get_content_type(path).to_string(),
        session_title: get_session_title(path, session_number),
        category: get_category(file.parent_folder(), session_number),
        flags: special_flags(path, file.file_name()),
        youtube_urls,
        resource_urls,
        contains_tables: detect_tables_in_content(text),
    }
}

/// Canonical `https://www.youtube.com/watch?v=<id>` URLs for every video referenced in `text`.
pub fn extract_youtube_urls(text: &str) -> BTreeSet<String> {
    YOUTUBE_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .filter_map(|captures| captures.get(1))
        .map(|id| format!("https://www.youtube.com/watch?v={}", id.as_str()))
        .collect()
}

/// Every http(s) URL in `text`, with trailing sentence punctuation removed.
pub fn extract_urls(text: &str) -> BTreeSet<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|found| {
            found
                .as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
        .filter(|url| url.len() > "https://".len())
        .collect()
}

fn is_youtube_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("youtube.com/") || lower.contains("youtu.be/")
}

/// Session number from the first pattern that matches `path` with a positive integer.
pub fn extract_session_number(path: &str) -> Option<u32> {
    SESSION_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(path)
            .and_then(|captures| captures.get(1))
            .and_then(|digits| digits.as_str().parse::<u32>().ok())
            .filter(|number| *number > 0)
    })
}

/// Facilitator name from the first accepted name-shaped match in `filename`.
pub fn extract_facilitator(filename: &str) -> Option<String> {
    FACILITATOR_PATTERNS.iter().find_map(|pattern| {
        let name = pattern.captures(filename)?.get(1)?.as_str().trim();
        let rejected = name.is_empty() || FACILITATOR_DENYLIST.contains(&name);
        (!rejected).then(|| name.to_string())
    })
}

/// Content-type tag from the first rule whose keywords all appear in `path`.
pub fn get_content_type(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    CONTENT_TYPE_RULES
        .iter()
        .find(|rule| rule.all_of.iter().all(|keyword| lower.contains(keyword)))
        .map(|rule| rule.tag)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Curated title for known sessions, else the filename text after the first hyphen, else the
/// bare filename stem.
pub fn get_session_title(path: &str, session_number: Option<u32>) -> String {
    if let Some(title) = session_number.and_then(curated_title) {
        return title.to_string();
    }

    let filename = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path);
    let stem = strip_known_extension(filename).trim();

    match stem.split_once('-') {
        Some((_, rest)) if !rest.trim().is_empty() => rest.trim().to_string(),
        _ => stem.to_string(),
    }
}

fn curated_title(session: u32) -> Option<&'static str> {
    SESSION_TITLES
        .iter()
        .find(|(number, _)| *number == session)
        .map(|(_, title)| *title)
}

fn strip_known_extension(filename: &str) -> &str {
    KNOWN_EXTENSIONS
        .iter()
        .find_map(|extension| {
            let split = filename.len().checked_sub(extension.len())?;
            let suffix = filename.get(split..)?;
            suffix
                .eq_ignore_ascii_case(extension)
                .then(|| &filename[..split])
        })
        .unwrap_or(filename)
}

/// Whether any line of `text` looks like a pipe-delimited table row.
pub fn detect_tables_in_content(text: &str) -> bool {
    TABLE_ROW_PATTERN.is_match(text)
}

/// Coarse grouping derived from the parent folder, falling back to the session number.
pub fn get_category(parent_folder: &str, session_number: Option<u32>) -> String {
    let folder = parent_folder.trim().to_lowercase();
    if let Some((_, category)) = FOLDER_CATEGORIES.iter().find(|(name, _)| *name == folder) {
        return category.to_string();
    }
    match session_number {
        Some(number) => format!("session_{number}"),
        None => "general".to_string(),
    }
}

fn special_flags(path: &str, filename: &str) -> BTreeMap<&'static str, bool> {
    let path = path.to_lowercase();
    let filename = filename.to_lowercase();
    FLAG_RULES
        .iter()
        .map(|rule| {
            let target = match rule.scope {
                FlagScope::FileName => &filename,
                FlagScope::Path => &path,
            };
            let set = rule.all_of.iter().all(|keyword| target.contains(keyword));
            (rule.key, set)
        })
        .collect()
}
