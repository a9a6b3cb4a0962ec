//! Qdrant vector store integration over its REST API.

pub mod client;
pub mod filters;
mod payload;
pub mod types;

pub use client::QdrantService;
pub use filters::build_search_filter;
pub use types::QdrantError;
