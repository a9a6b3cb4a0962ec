use crate::processing::{ProcessedDocument, SourceFile};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Counters accumulated over one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatistics {
    /// Files returned by discovery.
    pub files_discovered: usize,
    /// Files that produced at least one chunk.
    pub documents_loaded: usize,
    /// Files that failed extraction or had no content.
    pub files_skipped: usize,
    /// Chunks produced across all documents.
    pub total_chunks: usize,
    /// Loaded documents per category.
    pub by_category: BTreeMap<String, usize>,
    /// Loaded documents per session number.
    pub by_session: BTreeMap<u32, usize>,
    /// Loaded documents per file format.
    pub by_format: BTreeMap<String, usize>,
    /// Distinct facilitators seen.
    pub facilitators: BTreeSet<String>,
    /// Documents containing tables.
    pub files_with_tables: usize,
    /// Canonical YouTube URLs keyed by source file, for documents that mention any.
    pub youtube_links: BTreeMap<String, Vec<String>>,
}

impl IngestStatistics {
    /// Fold one loaded document into the counters.
    pub fn record_document(&mut self, file: &SourceFile, document: &ProcessedDocument) {
        let metadata = &document.metadata;
        self.documents_loaded += 1;
        self.total_chunks += document.chunks.len();
        *self
            .by_category
            .entry(metadata.category.clone())
            .or_default() += 1;
        if let Some(session) = metadata.session_number {
            *self.by_session.entry(session).or_default() += 1;
        }
        *self
            .by_format
            .entry(file.format().as_str().to_string())
            .or_default() += 1;
        if let Some(facilitator) = &metadata.facilitator {
            self.facilitators.insert(facilitator.clone());
        }
        if metadata.contains_tables {
            self.files_with_tables += 1;
        }
        if !metadata.youtube_urls.is_empty() {
            self.youtube_links.insert(
                file.relative_path().to_string(),
                metadata.youtube_urls.iter().cloned().collect(),
            );
        }
    }

    /// Count a file that produced no chunks.
    pub fn record_skipped(&mut self) {
        self.files_skipped += 1;
    }

    /// Human-readable summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Ingestion statistics");
        let _ = writeln!(out, "  Files discovered:  {}", self.files_discovered);
        let _ = writeln!(out, "  Documents loaded:  {}", self.documents_loaded);
        let _ = writeln!(out, "  Files skipped:     {}", self.files_skipped);
        let _ = writeln!(out, "  Total chunks:      {}", self.total_chunks);
        let _ = writeln!(out, "  Files with tables: {}", self.files_with_tables);
        let _ = writeln!(out, "  Files with videos: {}", self.youtube_links.len());

        let _ = writeln!(out, "  By category:");
        for (category, count) in &self.by_category {
            let _ = writeln!(out, "    {category}: {count}");
        }
        let _ = writeln!(out, "  By session:");
        for (session, count) in &self.by_session {
            let _ = writeln!(out, "    Session {session}: {count}");
        }
        let _ = writeln!(out, "  By format:");
        for (format, count) in &self.by_format {
            let _ = writeln!(out, "    {format}: {count}");
        }
        let facilitators: Vec<&str> = self.facilitators.iter().map(String::as_str).collect();
        let _ = write!(
            out,
            "  Facilitators ({}): {}",
            facilitators.len(),
            if facilitators.is_empty() {
                "none".to_string()
            } else {
                facilitators.join(", ")
            }
        );
        out
    }
}

/// Write the run summary to stdout. Observational only.
pub fn print_statistics(statistics: &IngestStatistics) {
    println!("{}", statistics.render());
}
