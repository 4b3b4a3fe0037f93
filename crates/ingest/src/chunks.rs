//! Chunk session tracking for chunked uploads.
//!
//! A chunk session is the server-side state for one client-driven
//! multi-part upload, keyed by a client-generated opaque token. Chunks of
//! the same session may arrive concurrently over parallel connections, so
//! each session's bookkeeping is serialized behind its own lock while
//! different sessions proceed fully in parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::IngestError;
use crate::options::ChunkOptions;

/// Width of zero-padded part names. Lexical sort of part names equals
/// upload order as long as indices stay below 10^PART_NAME_WIDTH.
const PART_NAME_WIDTH: usize = 5;

/// Format a chunk index as an on-disk part name.
///
/// Zero-padded so that a lexical sort reconstructs upload order even when
/// chunks arrive out of order.
pub fn part_name(index: usize) -> String {
    format!("{:0width$}", index, width = PART_NAME_WIDTH)
}

/// Per-session bookkeeping.
#[derive(Debug)]
struct ChunkSession {
    /// Session directory holding the part files.
    dir: PathBuf,
    /// Part names in arrival order (not upload-sequence order).
    parts: Vec<String>,
    /// Running byte total across received parts.
    total_bytes: u64,
    /// Last append/open, for stale sweeping.
    last_touched: Instant,
}

/// Tracks in-progress chunked uploads.
///
/// Process-wide service object: constructed once at startup and shared by
/// reference, never ambient global state.
pub struct ChunkSessionStore {
    /// Directory under which session directories are created.
    root: PathBuf,
    /// Chunk policy.
    options: ChunkOptions,
    /// Live sessions; per-key locking via the inner mutex.
    sessions: DashMap<String, Arc<Mutex<ChunkSession>>>,
}

impl ChunkSessionStore {
    /// Create a store rooted at the given directory.
    ///
    /// # Arguments
    /// * `root` - Directory for session subdirectories
    /// * `options` - Chunk policy (part cap, stale age)
    pub fn new(root: impl Into<PathBuf>, options: ChunkOptions) -> Self {
        Self {
            root: root.into(),
            options,
            sessions: DashMap::new(),
        }
    }

    /// Open (or re-open) a session; idempotent.
    ///
    /// On first call for a session id the on-disk directory and tracking
    /// entry are created; later calls return the existing directory with
    /// no side effects. The directory derives from the id alone, so no
    /// session lock is taken here; map guards are never held across an
    /// await.
    ///
    /// # Errors
    /// `ChunkSessionInvalid` for ids that could escape the chunk root;
    /// I/O errors if the directory cannot be created.
    pub async fn open_session(&self, session_id: &str) -> Result<PathBuf, IngestError> {
        validate_session_id(session_id)?;
        let dir: PathBuf = self.root.join(session_id);

        if self.sessions.contains_key(session_id) {
            return Ok(dir);
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IngestError::io(dir.display().to_string(), e))?;

        // A concurrent first chunk may have created the entry between the
        // lookup above and here; entry() keeps exactly one. The guard it
        // returns is dropped at the end of the statement.
        self.sessions.entry(session_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(ChunkSession {
                dir: dir.clone(),
                parts: Vec::new(),
                total_bytes: 0,
                last_touched: Instant::now(),
            }))
        });
        Ok(dir)
    }

    /// Record a received chunk.
    ///
    /// Appends the part name and adds to the running byte total. Mutation
    /// is serialized per session by the entry lock.
    ///
    /// # Errors
    /// `ChunkSessionMissing` if the session was never opened;
    /// `TooManyChunks` when the part cap is reached.
    pub async fn append_chunk(
        &self,
        session_id: &str,
        part: &str,
        byte_len: u64,
    ) -> Result<(), IngestError> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock().await;
        if session.parts.len() >= self.options.max_chunks {
            return Err(IngestError::TooManyChunks {
                max: self.options.max_chunks,
            });
        }
        session.parts.push(part.to_string());
        session.total_bytes += byte_len;
        session.last_touched = Instant::now();
        Ok(())
    }

    /// Running byte total for a session.
    pub async fn total_bytes(&self, session_id: &str) -> Result<u64, IngestError> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        Ok(session.total_bytes)
    }

    /// Number of parts recorded for a session.
    pub async fn part_count(&self, session_id: &str) -> Result<usize, IngestError> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        Ok(session.parts.len())
    }

    /// Snapshot a session for assembly: directory, lexically sorted part
    /// names, and tracked byte total.
    pub async fn parts_sorted(
        &self,
        session_id: &str,
    ) -> Result<(PathBuf, Vec<String>, u64), IngestError> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        let mut parts: Vec<String> = session.parts.clone();
        parts.sort();
        Ok((session.dir.clone(), parts, session.total_bytes))
    }

    /// Destroy a session: delete all chunk files, remove the directory,
    /// evict the tracking entry.
    ///
    /// Safe to call on sessions with zero or partial chunks and on ids
    /// that were never opened; cleanup must run even when the triggering
    /// error had nothing to do with a specific chunk.
    pub async fn discard_session(&self, session_id: &str) {
        let removed = self.sessions.remove(session_id);

        let dir: PathBuf = match removed {
            Some((_, entry)) => {
                let session = entry.lock().await;
                session.dir.clone()
            }
            None => {
                if validate_session_id(session_id).is_err() {
                    return;
                }
                self.root.join(session_id)
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove chunk session dir {}: {}", dir.display(), e);
            }
        }
    }

    /// Discard sessions idle longer than `max_age`.
    ///
    /// The engine exposes the sweep; scheduling it is up to the embedding
    /// application.
    ///
    /// # Returns
    /// Number of sessions discarded.
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        // Snapshot the live entries first so no map guard is held while
        // awaiting a session lock.
        let snapshot: Vec<(String, Arc<Mutex<ChunkSession>>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut stale: Vec<String> = Vec::new();
        for (session_id, session) in snapshot {
            let session = session.lock().await;
            if session.last_touched.elapsed() > max_age {
                stale.push(session_id);
            }
        }

        for session_id in &stale {
            log::debug!("Sweeping stale chunk session {}", session_id);
            self.discard_session(session_id).await;
        }
        stale.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// The configured chunk policy.
    pub fn options(&self) -> &ChunkOptions {
        &self.options
    }

    /// The chunk root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, session_id: &str) -> Result<Arc<Mutex<ChunkSession>>, IngestError> {
        self.sessions
            .get(session_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| IngestError::ChunkSessionMissing {
                id: session_id.to_string(),
            })
    }
}

/// Session ids are client-generated; constrain them to a safe charset so
/// they can never traverse outside the chunk root.
fn validate_session_id(session_id: &str) -> Result<(), IngestError> {
    let valid: bool = !session_id.is_empty()
        && session_id.len() <= 64
        && session_id
            .chars()
            .all(|c: char| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(IngestError::ChunkSessionInvalid)
    }
}
