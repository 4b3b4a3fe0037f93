//! Metadata catalog for stashbin stored objects.
//!
//! The ingestion engine records every committed upload as a catalog row and
//! consults the catalog for content-hash deduplication. This crate defines
//! the catalog contract (`Catalog`) plus a SQLite reference backend:
//!
//! - **Dedup lookup** - find an existing row with the same
//!   (owner, hash, size) triple before storing new bytes
//! - **Batch insert** - commit all accepted files of one request together
//! - **Album touch-ups** - ownership verification and "edited at" bumps,
//!   the only album writes the engine performs

mod error;
mod sqlite;
mod traits;
mod types;

pub use error::CatalogError;
pub use sqlite::SqliteCatalog;
pub use traits::Catalog;
pub use types::{current_epoch_seconds, NewObject, StoredObject};
