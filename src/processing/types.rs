//! Core data types and error definitions for document processing.

use crate::metadata::ExtractedMetadata;
use crate::store::Metadata;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while loading or extracting a single document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// File could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Word document archive was malformed.
    #[error("Invalid word document archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// PDF text extraction failed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// Extractor has no reader for this format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// File exceeded the extraction size limit.
    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),
}

impl DocumentError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Source formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileFormat {
    /// Word-processor document (`.docx`).
    Word,
    /// Markdown (`.md`, `.markdown`).
    Markdown,
    /// Portable document format (`.pdf`).
    Pdf,
}

impl FileFormat {
    /// Every accepted extension, lower-case and without the dot.
    pub const EXTENSIONS: &'static [&'static str] = &["docx", "md", "markdown", "pdf"];

    /// Classify a path strictly by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "docx" => Some(Self::Word),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Tag persisted in chunk metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Word => "docx",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
        }
    }
}

/// One file discovered for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    relative_path: String,
    file_name: String,
    parent_folder: String,
    format: FileFormat,
}

impl SourceFile {
    /// Describe a standalone file; its relative path is the bare filename.
    pub fn new(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        Self::build(path, file_name)
    }

    /// Describe a file found under `root`; its relative path is taken from the root.
    pub fn under_root(root: &Path, path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let relative = path
            .strip_prefix(root)
            .ok()?
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if relative.is_empty() {
            return None;
        }
        Self::build(path, relative)
    }

    fn build(path: PathBuf, relative_path: String) -> Option<Self> {
        let format = FileFormat::from_path(&path)?;
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let parent_folder = path
            .parent()
            .and_then(|parent| parent.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Self {
            path,
            relative_path,
            file_name,
            parent_folder,
            format,
        })
    }

    /// Full path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the content root, `/`-separated.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Name of the directory that contains the file.
    pub fn parent_folder(&self) -> &str {
        &self.parent_folder
    }

    /// Format derived from the extension.
    pub fn format(&self) -> FileFormat {
        self.format
    }
}

/// Nearest section and subsection headings preceding a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionInfo {
    /// Number from a `SECTION <n>: <title>` heading.
    pub section_number: Option<u32>,
    /// Title from the same heading.
    pub section_title: Option<String>,
    /// Text of the last `### ` heading.
    pub subsection: Option<String>,
}

/// One retrievable fragment of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Context banner followed by the chunk body; this is what gets embedded.
    pub content: String,
    /// Chunk text with table markers removed.
    pub body: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Section headings resolved for the chunk.
    pub section: SectionInfo,
    /// Flat metadata persisted with the chunk; `source_file` refers back to the document.
    pub metadata: Metadata,
}

/// A document that produced at least one chunk.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    /// Metadata inferred for the whole file.
    pub metadata: ExtractedMetadata,
    /// Chunks in document order.
    pub chunks: Vec<Chunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_are_identified_by_extension_only() {
        assert_eq!(
            FileFormat::from_path(Path::new("a/Notes.DOCX")),
            Some(FileFormat::Word)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("readme.markdown")),
            Some(FileFormat::Markdown)
        );
        assert_eq!(FileFormat::from_path(Path::new("slides.pptx")), None);
        assert_eq!(FileFormat::from_path(Path::new("pdf")), None);
    }

    #[test]
    fn source_file_under_root_keeps_relative_path() {
        let root = Path::new("/data/lms");
        let file =
            SourceFile::under_root(root, "/data/lms/Session 2/4T Notes.docx").expect("source");
        assert_eq!(file.relative_path(), "Session 2/4T Notes.docx");
        assert_eq!(file.file_name(), "4T Notes.docx");
        assert_eq!(file.parent_folder(), "Session 2");
        assert_eq!(file.format(), FileFormat::Word);
    }

    #[test]
    fn standalone_source_file_uses_filename() {
        let file = SourceFile::new("/tmp/guide.md").expect("source");
        assert_eq!(file.relative_path(), "guide.md");
        assert_eq!(file.parent_folder(), "tmp");
        assert!(SourceFile::new("/tmp/image.png").is_none());
    }
}
