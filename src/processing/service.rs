//! Document processor turning one source file into banner-prefixed, metadata-rich chunks.

use crate::metadata::{ExtractedMetadata, detect_tables_in_content, extract_metadata};
use crate::processing::{
    extract::{DefaultExtractor, TextExtractor},
    sections::resolve_section,
    splitter::{SplitterConfig, TextSplitter},
    tables::{mark_table_boundaries, strip_table_markers},
    types::{Chunk, DocumentError, ProcessedDocument, SectionInfo, SourceFile},
};
use crate::store::{Metadata, MetadataValue};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Loads documents and splits them into chunks.
///
/// Documents that contain tables are marked up and split with the table splitter; everything
/// else goes through the default splitter.
pub struct DocumentProcessor {
    extractor: Box<dyn TextExtractor>,
    default_splitter: TextSplitter,
    table_splitter: TextSplitter,
}

impl DocumentProcessor {
    /// Processor using the built-in extractors.
    pub fn new(default: SplitterConfig, table: SplitterConfig) -> Self {
        Self::with_extractor(Box::new(DefaultExtractor::default()), default, table)
    }

    /// Processor with a custom extractor.
    pub fn with_extractor(
        extractor: Box<dyn TextExtractor>,
        default: SplitterConfig,
        table: SplitterConfig,
    ) -> Self {
        Self {
            extractor,
            default_splitter: TextSplitter::new(default),
            table_splitter: TextSplitter::new(table),
        }
    }

    /// Chunks for `file`; any failure is logged and yields an empty list.
    pub fn load_document(&self, file: &SourceFile) -> Vec<Chunk> {
        self.load_processed(file)
            .map(|document| document.chunks)
            .unwrap_or_default()
    }

    /// Like [`Self::load_document`] but keeps the document-level metadata.
    pub fn load_processed(&self, file: &SourceFile) -> Option<ProcessedDocument> {
        match self.try_load_document(file) {
            Ok(document) => document,
            Err(error) => {
                tracing::error!(
                    file = %file.relative_path(),
                    error = %error,
                    "Failed to load document"
                );
                None
            }
        }
    }

    /// Extract and chunk `file`. `Ok(None)` means the file was skipped: unsupported or empty.
    pub fn try_load_document(
        &self,
        file: &SourceFile,
    ) -> Result<Option<ProcessedDocument>, DocumentError> {
        let fragments = match self.extractor.extract(file.path(), file.format()) {
            Ok(fragments) => fragments,
            Err(DocumentError::UnsupportedFormat(format)) => {
                tracing::debug!(file = %file.relative_path(), format, "Skipping unsupported file");
                return Ok(None);
            }
            Err(error) => return Err(error),
        };
        let text = fragments.join("\n\n");
        Ok(self.process_text(file, &text))
    }

    /// Chunk already-extracted text for `file`.
    pub fn process_text(&self, file: &SourceFile, text: &str) -> Option<ProcessedDocument> {
        if text.trim().is_empty() {
            tracing::warn!(file = %file.relative_path(), "Document has no text content");
            return None;
        }

        let metadata = extract_metadata(file, text);
        let (marked, splitter) = if metadata.contains_tables {
            (mark_table_boundaries(text), &self.table_splitter)
        } else {
            (text.to_string(), &self.default_splitter)
        };

        let pieces = splitter.split_text(&marked);
        let total_chunks = pieces.len();
        let processed_date = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        let chunks: Vec<Chunk> = pieces
            .iter()
            .enumerate()
            .map(|(chunk_index, raw)| {
                let body = strip_table_markers(raw).trim().to_string();
                let section = resolve_section(&marked, text, raw, &body);
                let chunk_has_table = detect_tables_in_content(&body);
                let content = format!(
                    "{}\n\n{}",
                    context_banner(file, &metadata, &section, chunk_has_table),
                    body
                );
                let chunk_metadata = ChunkMetadata {
                    file,
                    document: &metadata,
                    section: &section,
                    chunk_index,
                    total_chunks,
                    chunk_has_table,
                    processed_date: &processed_date,
                    content_hash: compute_content_hash(&body),
                }
                .build();
                Chunk {
                    content,
                    body,
                    chunk_index,
                    section,
                    metadata: chunk_metadata,
                }
            })
            .collect();

        tracing::info!(
            file = %file.relative_path(),
            chunks = chunks.len(),
            tables = metadata.contains_tables,
            session = ?metadata.session_number,
            "Processed document"
        );
        Some(ProcessedDocument { metadata, chunks })
    }
}

/// Readable context lines prepended to every chunk before embedding.
fn context_banner(
    file: &SourceFile,
    metadata: &ExtractedMetadata,
    section: &SectionInfo,
    chunk_has_table: bool,
) -> String {
    let mut lines = Vec::new();
    if let Some(session) = metadata.session_number {
        lines.push(format!("Session {session}: {}", metadata.session_title));
    }
    if let Some(facilitator) = &metadata.facilitator {
        lines.push(format!("Facilitator: {facilitator}"));
    }
    match (section.section_number, &section.section_title) {
        (Some(number), Some(title)) => lines.push(format!("Section {number}: {title}")),
        (None, Some(title)) => lines.push(format!("Section: {title}")),
        _ => {}
    }
    if let Some(subsection) = &section.subsection {
        lines.push(format!("Topic: {subsection}"));
    }
    if chunk_has_table {
        lines.push("Contains Tables: Yes".to_string());
    }
    lines.push(format!("File: {}", file.file_name()));
    lines.join("\n")
}

struct ChunkMetadata<'a> {
    file: &'a SourceFile,
    document: &'a ExtractedMetadata,
    section: &'a SectionInfo,
    chunk_index: usize,
    total_chunks: usize,
    chunk_has_table: bool,
    processed_date: &'a str,
    content_hash: String,
}

impl ChunkMetadata<'_> {
    fn build(self) -> Metadata {
        let document = self.document;
        let mut metadata = Metadata::new();
        let mut put = |key: &str, value: MetadataValue| {
            metadata.insert(key.to_string(), value);
        };

        put("source_file", self.file.relative_path().into());
        put("file_name", self.file.file_name().into());
        put("file_path", self.file.path().display().to_string().into());
        put("parent_folder", self.file.parent_folder().into());
        put("file_format", self.file.format().as_str().into());
        put("session_number", document.session_number.into());
        put("session_title", document.session_title.as_str().into());
        put("facilitator", document.facilitator.clone().into());
        put("content_type", document.content_type.as_str().into());
        put("category", document.category.as_str().into());
        for (flag, set) in &document.flags {
            put(*flag, (*set).into());
        }
        put("youtube_urls", join(&document.youtube_urls).into());
        put("has_youtube", (!document.youtube_urls.is_empty()).into());
        put("resource_urls", join(&document.resource_urls).into());
        put("contains_tables", document.contains_tables.into());
        put("chunk_contains_table", self.chunk_has_table.into());
        put("processed_date", self.processed_date.into());
        put("chunk_index", self.chunk_index.into());
        put("total_chunks", self.total_chunks.into());
        put("document_section_number", self.section.section_number.into());
        put(
            "document_section_title",
            self.section.section_title.clone().into(),
        );
        put("document_subsection", self.section.subsection.clone().into());
        put("content_hash", self.content_hash.into());
        metadata
    }
}

fn join<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Hex SHA-256 of the chunk body.
pub(crate) fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
