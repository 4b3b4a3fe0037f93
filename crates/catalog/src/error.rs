//! Error types for catalog operations.

use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error, Clone)]
pub enum CatalogError {
    /// Underlying database error.
    #[error("Catalog database error: {message}")]
    Database {
        /// Error message from the database driver.
        message: String,
    },

    /// A row that should exist was not found.
    #[error("Catalog row not found: {what}")]
    NotFound {
        /// Description of the missing row.
        what: String,
    },
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }
}
