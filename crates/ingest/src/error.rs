//! Error types for ingestion operations.

use thiserror::Error;

use stashbin_catalog::CatalogError;
use stashbin_common::FileIoError;

/// Errors that can occur while ingesting an upload.
///
/// Validation-class errors are user visible and reported per file in the
/// batch response; internal errors (I/O, catalog) are logged server-side
/// and surface only a generic message.
#[derive(Debug, Error, Clone)]
pub enum IngestError {
    /// Extension rejected by the filter policy.
    #[error("{ext} files are not permitted")]
    ExtensionBlocked {
        /// The offending extension, e.g. `.exe`.
        ext: String,
    },

    /// Filename has no extension and policy rejects extensionless files.
    #[error("Files with no extension are not permitted")]
    ExtensionMissing,

    /// Zero-byte body with empty-file rejection enabled.
    #[error("Empty files are not permitted")]
    EmptyFile,

    /// File exceeds the configured size cap.
    #[error("File too large (limit {limit_mb} MB)")]
    FileTooLarge {
        /// Size cap in megabytes.
        limit_mb: u64,
    },

    /// Request carried more files than the batch cap allows.
    #[error("Too many files per request (max {max})")]
    TooManyFiles {
        /// Maximum files per request.
        max: usize,
    },

    /// Identifier allocation retry bound reached.
    #[error("Could not allocate a unique identifier of length {length}")]
    AllocationExhausted {
        /// The stem length that was requested.
        length: usize,
    },

    /// Assembled file size does not match the session's tracked total.
    #[error("Assembled size mismatch: expected {expected} bytes, got {actual}")]
    ChunkSizeMismatch {
        /// Expected byte count.
        expected: u64,
        /// Actual byte count after assembly.
        actual: u64,
    },

    /// Chunk-finish referenced a session that was never opened.
    #[error("Unknown chunk session: {id}")]
    ChunkSessionMissing {
        /// The session identifier.
        id: String,
    },

    /// Session identifier failed validation (charset/length).
    #[error("Invalid chunk session id")]
    ChunkSessionInvalid,

    /// Session exceeded the configured chunk-count cap.
    #[error("Too many chunks (max {max})")]
    TooManyChunks {
        /// Maximum chunks per session.
        max: usize,
    },

    /// Malware scanner returned a non-clean verdict. Batch-fatal.
    #[error("Malware detected: {threat}")]
    ScanPositive {
        /// Threat name extracted from the verdict.
        threat: String,
        /// Whether later files in the batch were left unchecked.
        more_unchecked: bool,
    },

    /// Malware scanner itself failed. Batch-fatal.
    #[error("Malware scan failed: {message}")]
    ScanFailed {
        /// Sanitized scanner error message.
        message: String,
    },

    /// Remote server answered with a non-200 status.
    #[error("Remote server responded with HTTP {status}")]
    RemoteFetchFailed {
        /// The HTTP status code.
        status: u16,
    },

    /// Transport-level failure while fetching a remote URL.
    #[error("Could not fetch remote URL: {message}")]
    RemoteFetchError {
        /// Error message.
        message: String,
    },

    /// The supplied URL is not fetchable (bad scheme, unparsable).
    #[error("Invalid remote URL")]
    RemoteUrlInvalid,

    /// Permanent retention requested but not in the allowed list.
    #[error("Permanent uploads are not permitted")]
    PermanentUploadsProhibited,

    /// Requested retention period is not in the allowed list.
    #[error("Retention period of {hours} hours is not permitted")]
    RetentionNotAllowed {
        /// The requested retention in hours.
        hours: f64,
    },

    /// Local disk I/O failure.
    #[error(transparent)]
    Io(#[from] FileIoError),

    /// Catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl IngestError {
    /// Whether this error's description may be shown to the client.
    ///
    /// Internal failures (disk, catalog) are logged in full server-side
    /// but clients only ever see a generic message for them.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, IngestError::Io(_) | IngestError::Catalog(_))
    }

    /// Convenience constructor for I/O failures at a known path.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        IngestError::Io(FileIoError::from_io(path, err))
    }
}
