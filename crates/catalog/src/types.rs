//! Catalog row types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A committed stored object (one catalog row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Row id assigned by the catalog.
    pub id: i64,
    /// Stored name: random identifier stem plus original extension.
    /// Unique across the catalog; doubles as the on-disk filename.
    pub name: String,
    /// Owning user, None for anonymous uploads.
    pub owner_id: Option<i64>,
    /// Original client-supplied filename.
    pub original: String,
    /// Declared MIME type.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
    /// XXH128 content hash, 32-char lowercase hex.
    pub hash: String,
    /// Source IP, None when IP logging is disabled by policy.
    pub ip: Option<String>,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    /// Expiry time for temporary uploads, epoch seconds.
    pub expires_at: Option<i64>,
    /// Associated album, if any.
    pub album_id: Option<i64>,
}

/// Insert payload for a new stored object (row id not yet assigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    /// Stored name (identifier stem + extension).
    pub name: String,
    /// Owning user, None for anonymous.
    pub owner_id: Option<i64>,
    /// Original client-supplied filename.
    pub original: String,
    /// Declared MIME type.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
    /// XXH128 content hash.
    pub hash: String,
    /// Source IP, policy-gated.
    pub ip: Option<String>,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    /// Expiry time, epoch seconds.
    pub expires_at: Option<i64>,
    /// Associated album, if any.
    pub album_id: Option<i64>,
}

/// Get current time as epoch seconds.
pub fn current_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
