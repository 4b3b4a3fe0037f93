//! Fire-and-forget collaborator contracts.
//!
//! Thumbnail generation and cache invalidation are side effects of a
//! successful commit: the pipeline emits them without awaiting business
//! results and only logs failures.

use async_trait::async_trait;

use crate::error::IngestError;

/// Thumbnail generation collaborator.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Request a thumbnail for a newly stored object.
    ///
    /// # Arguments
    /// * `name` - Stored name (stem + extension)
    /// * `ext` - The classified extension, e.g. `.png`
    async fn request_thumbnail(&self, name: &str, ext: &str) -> Result<(), IngestError>;
}

/// Which server-side cache a commit invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Album public pages and counts.
    Albums,
    /// Per-user statistics.
    Users,
    /// Upload listings and totals.
    Uploads,
}

/// Cache invalidation collaborator.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Invalidate a server-side cache category.
    async fn invalidate(&self, kind: CacheKind) -> Result<(), IngestError>;

    /// Purge edge-cached URLs for the given stored names.
    async fn purge_edge(&self, names: &[String]) -> Result<(), IngestError>;
}
