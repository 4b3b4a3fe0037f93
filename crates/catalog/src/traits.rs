//! The catalog contract consumed by the ingestion pipeline.

use async_trait::async_trait;

use crate::error::CatalogError;
use crate::types::{NewObject, StoredObject};

/// Metadata catalog operations - implemented by each backend.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert a batch of newly committed objects.
    ///
    /// All accepted files of one upload request are inserted together.
    ///
    /// # Returns
    /// Row ids of the inserted objects, in input order.
    async fn insert_objects(&self, objects: &[NewObject]) -> Result<Vec<i64>, CatalogError>;

    /// Look up an existing row with identical (owner, hash, size).
    ///
    /// This is the dedup check. It is deliberately not backed by a
    /// uniqueness constraint: two concurrent identical uploads may both
    /// miss here and produce two rows, which is an accepted limitation of
    /// the check-then-insert design.
    async fn find_duplicate(
        &self,
        owner_id: Option<i64>,
        hash: &str,
        size: u64,
    ) -> Result<Option<StoredObject>, CatalogError>;

    /// Look up a committed object by stored name.
    async fn find_by_name(&self, name: &str) -> Result<Option<StoredObject>, CatalogError>;

    /// Check whether an album exists and belongs to the given owner.
    ///
    /// Anonymous uploads (owner None) never own albums.
    async fn album_owned_by(
        &self,
        album_id: i64,
        owner_id: Option<i64>,
    ) -> Result<bool, CatalogError>;

    /// Bump the "edited at" timestamp on the given albums.
    ///
    /// Called once per upload batch with every distinct album actually
    /// referenced by an inserted row; public page caches key on this
    /// timestamp.
    async fn bump_album_edited_at(&self, album_ids: &[i64]) -> Result<(), CatalogError>;

    /// Delete the row for a stored name.
    ///
    /// Used by expiry sweeps and by tests; the ingestion path never
    /// deletes committed rows.
    async fn delete_object(&self, name: &str) -> Result<(), CatalogError>;
}
