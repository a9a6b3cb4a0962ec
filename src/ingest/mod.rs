//! Ingestion pipeline: file discovery, batched embedding with rate-limit retries, and run
//! statistics.

mod creator;
mod discovery;
pub mod retry;
mod stats;
mod tokens;

pub use creator::{BatchError, IndexSummary, IngestError, IngestReport, VectorStoreCreator};
pub use discovery::discover_files;
pub use retry::{Failure, RetryMachine, RetryPolicy, RetryState};
pub use stats::{IngestStatistics, print_statistics};
pub use tokens::TokenEstimator;
