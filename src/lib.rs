#![deny(missing_docs)]

//! Core library for the course content index: ingestion of course documents into a
//! filterable embedding index, and read-only retrieval against it.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Discovery, batched indexing, and run statistics.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Path and content heuristics for document metadata.
pub mod metadata;
/// Text extraction, table handling, and section-aware chunking.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Loading a built index and answering filtered queries.
pub mod retrieval;
/// Persistence seam and the local directory-backed index.
pub mod store;
