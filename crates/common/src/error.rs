//! Shared error types used across stashbin crates.

use thiserror::Error;

/// File I/O error carrying the path it occurred at.
///
/// `std::io::Error` alone loses the path by the time it crosses a crate
/// boundary; disk failures in stashbin are reported through this type so
/// the operator can see which file was involved.
#[derive(Debug, Error, Clone)]
#[error("I/O error at {path}: {message}")]
pub struct FileIoError {
    /// Path where the error occurred.
    pub path: String,
    /// Error message from the underlying I/O error.
    pub message: String,
}

impl FileIoError {
    /// Create a FileIoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
