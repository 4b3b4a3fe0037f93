//! SQLite backend for the catalog.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::CatalogError;
use crate::traits::Catalog;
use crate::types::{current_epoch_seconds, NewObject, StoredObject};

/// SQLite-based catalog backend.
///
/// Stores object and album rows in a local SQLite database.
/// Uses WAL mode for better concurrent read performance.
pub struct SqliteCatalog {
    /// Database connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Database schema version (part of the table names).
    const CATALOG_DB_VERSION: u32 = 1;

    /// Create or open a SQLite catalog at the given path.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn open(db_path: &Path) -> Result<Self, CatalogError> {
        let conn: Connection = Connection::open(db_path)?;
        Self::initialize(conn)
    }

    /// Create an in-memory catalog (tests, throwaway deployments).
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn: Connection = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, CatalogError> {
        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        // Set busy timeout to handle concurrent access
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let v: u32 = Self::CATALOG_DB_VERSION;

        // No UNIQUE(owner_id, hash, size) here: the dedup check is
        // check-then-insert and the duplicate race is accepted.
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS objects_v{} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    owner_id INTEGER,
                    original TEXT NOT NULL,
                    mime TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    hash TEXT NOT NULL,
                    ip TEXT,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER,
                    album_id INTEGER
                )",
                v
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_objects_v{}_dedup
                 ON objects_v{}(owner_id, hash, size)",
                v, v
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS albums_v{} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id INTEGER NOT NULL,
                    edited_at INTEGER NOT NULL
                )",
                v
            ),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an album owned by the given user.
    ///
    /// The ingestion engine only reads albums; creation exists for the
    /// embedding application and for tests.
    ///
    /// # Returns
    /// The new album's row id.
    pub fn create_album(&self, owner_id: i64) -> Result<i64, CatalogError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO albums_v{} (owner_id, edited_at) VALUES (?, ?)",
                Self::CATALOG_DB_VERSION
            ),
            params![owner_id, current_epoch_seconds()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Read an album's "edited at" timestamp.
    pub fn album_edited_at(&self, album_id: i64) -> Result<Option<i64>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let edited: Option<i64> = conn
            .query_row(
                &format!(
                    "SELECT edited_at FROM albums_v{} WHERE id = ?",
                    Self::CATALOG_DB_VERSION
                ),
                params![album_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(edited)
    }

    /// Number of object rows (tests and stats).
    pub fn object_count(&self) -> Result<usize, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM objects_v{}", Self::CATALOG_DB_VERSION),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn row_to_object(row: &Row<'_>) -> rusqlite::Result<StoredObject> {
        Ok(StoredObject {
            id: row.get(0)?,
            name: row.get(1)?,
            owner_id: row.get(2)?,
            original: row.get(3)?,
            mime: row.get(4)?,
            size: row.get::<_, i64>(5)? as u64,
            hash: row.get(6)?,
            ip: row.get(7)?,
            created_at: row.get(8)?,
            expires_at: row.get(9)?,
            album_id: row.get(10)?,
        })
    }

    const OBJECT_COLUMNS: &'static str =
        "id, name, owner_id, original, mime, size, hash, ip, created_at, expires_at, album_id";
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn insert_objects(&self, objects: &[NewObject]) -> Result<Vec<i64>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let mut ids: Vec<i64> = Vec::with_capacity(objects.len());
        for object in objects {
            tx.execute(
                &format!(
                    "INSERT INTO objects_v{} (name, owner_id, original, mime, size, hash,
                                              ip, created_at, expires_at, album_id)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    Self::CATALOG_DB_VERSION
                ),
                params![
                    object.name,
                    object.owner_id,
                    object.original,
                    object.mime,
                    object.size as i64,
                    object.hash,
                    object.ip,
                    object.created_at,
                    object.expires_at,
                    object.album_id,
                ],
            )?;
            ids.push(tx.last_insert_rowid());
        }

        tx.commit()?;
        Ok(ids)
    }

    async fn find_duplicate(
        &self,
        owner_id: Option<i64>,
        hash: &str,
        size: u64,
    ) -> Result<Option<StoredObject>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let object: Option<StoredObject> = conn
            .query_row(
                &format!(
                    "SELECT {} FROM objects_v{}
                     WHERE owner_id IS ? AND hash = ? AND size = ?
                     ORDER BY id LIMIT 1",
                    Self::OBJECT_COLUMNS,
                    Self::CATALOG_DB_VERSION
                ),
                params![owner_id, hash, size as i64],
                Self::row_to_object,
            )
            .optional()?;
        Ok(object)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<StoredObject>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let object: Option<StoredObject> = conn
            .query_row(
                &format!(
                    "SELECT {} FROM objects_v{} WHERE name = ?",
                    Self::OBJECT_COLUMNS,
                    Self::CATALOG_DB_VERSION
                ),
                params![name],
                Self::row_to_object,
            )
            .optional()?;
        Ok(object)
    }

    async fn album_owned_by(
        &self,
        album_id: i64,
        owner_id: Option<i64>,
    ) -> Result<bool, CatalogError> {
        // Anonymous uploaders own nothing.
        let owner: i64 = match owner_id {
            Some(owner) => owner,
            None => return Ok(false),
        };

        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                &format!(
                    "SELECT id FROM albums_v{} WHERE id = ? AND owner_id = ?",
                    Self::CATALOG_DB_VERSION
                ),
                params![album_id, owner],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn bump_album_edited_at(&self, album_ids: &[i64]) -> Result<(), CatalogError> {
        if album_ids.is_empty() {
            return Ok(());
        }

        let now: i64 = current_epoch_seconds();
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for album_id in album_ids {
            tx.execute(
                &format!(
                    "UPDATE albums_v{} SET edited_at = ? WHERE id = ?",
                    Self::CATALOG_DB_VERSION
                ),
                params![now, album_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<(), CatalogError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "DELETE FROM objects_v{} WHERE name = ?",
                Self::CATALOG_DB_VERSION
            ),
            params![name],
        )?;
        Ok(())
    }
}
