#![warn(missing_docs)]
//! Core library entry points for the reposense ingestion pipeline.

pub mod complexity;
pub mod controls;
pub mod documents;
pub mod github;
pub mod loader;
pub mod pipeline;
pub mod runtime;
pub mod services;
pub mod store;

pub use complexity::is_complex_file;
pub use controls::{IngestControls, RetryPolicy};
pub use documents::{Document, EmbeddingRecord, SummaryRecord};
pub use github::{
    check_credits, count_files, EntryKind, GithubClient, HostError, Listing, RepoHost,
    RepoLocator, TreeEntry,
};
pub use loader::{DocumentLoader, LoaderError};
pub use pipeline::{embed_all, persist_all, summarize_all, DropReason, ItemOutcome};
pub use runtime::index_repository;
pub use services::{
    ChatSummarizer, EmbeddingService, OpenAiEmbedder, ServiceError, SummaryService,
};
pub use store::{EmbeddingStore, RecordSink, TableName};

#[cfg(feature = "debug_logs")]
#[macro_export]
// This allows use of the `eprintln!` macro via `debug_log!` macro.
macro_rules! debug_log {
        ($($arg:tt)*) => {
            eprintln!($($arg)*);
        };
    }
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
// This effectively disables the `eprintln!` macro, effectively removing it from the code during
// compilation.
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}
