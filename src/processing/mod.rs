//! Document processing: text extraction, table marking, recursive splitting, and per-chunk
//! metadata.

mod extract;
mod sections;
mod service;
pub mod splitter;
pub mod tables;
mod types;

pub use extract::{DefaultExtractor, MAX_FILE_SIZE, TextExtractor};
pub use sections::resolve_section;
pub use service::DocumentProcessor;
pub use splitter::{SplitterConfig, TextSplitter};
pub use types::{Chunk, DocumentError, FileFormat, ProcessedDocument, SectionInfo, SourceFile};
