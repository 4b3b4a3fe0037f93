//! Chunked upload ingestion and deduplication engine.
//!
//! This crate receives file data - direct uploads, chunked multipart
//! sequences, or server-fetched remote URLs - assembles it into a
//! canonically named stored object, deduplicates it against previously
//! stored content by XXH128 hash, and commits metadata to a catalog.
//!
//! The top-level coordinator is [`IngestPipeline`]; its collaborators are:
//!
//! - **Identifier allocation** (`naming`) - collision-checked random names
//! - **Chunk sessions** (`chunks`) - in-progress chunked uploads keyed by a
//!   client-supplied session token
//! - **Chunk assembly** (`assemble`) - ordered concatenation of a session's
//!   parts into one file with size verification
//! - **Remote fetching** (`fetch`) - size-capped streaming download of URL
//!   uploads
//! - **Retention policy** (`age`) - optional expiry timestamps for
//!   temporary uploads
//! - **Malware scanning** (`scan`) - optional batch-fatal verdict stage
//!
//! Surrounding functionality (authentication, page rendering, thumbnail
//! generation, edge cache purging) lives elsewhere; the engine consumes a
//! [`Catalog`](stashbin_catalog::Catalog) and emits fire-and-forget
//! thumbnail and cache-invalidation signals through the traits in
//! [`traits`].

pub mod age;
pub mod assemble;
pub mod chunks;
pub mod error;
pub mod fetch;
pub mod naming;
pub mod options;
pub mod pipeline;
pub mod scan;
pub mod traits;

pub use chunks::ChunkSessionStore;
pub use error::IngestError;
pub use fetch::{ContentFetcher, FetchedContent};
pub use naming::NameAllocator;
pub use options::{
    ChunkOptions, FilterMode, FilterOptions, IngestOptions, NamingOptions, RemoteOptions,
    RetentionOptions,
};
pub use pipeline::{
    BatchOutcome, ChunkFinishEntry, ChunkPart, DirectFile, FileOutcome, IngestPipeline,
    RemoteUrl, UploadContext, UploadedFile,
};
pub use scan::{parse_verdict, ScanOutcome, Scanner, VerdictMarkers};
pub use traits::{CacheInvalidator, CacheKind, Thumbnailer};
