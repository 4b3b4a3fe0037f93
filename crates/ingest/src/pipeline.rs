//! The ingestion pipeline: end-to-end orchestration of one upload request.
//!
//! Per file the pipeline runs a staged state machine:
//!
//! ```text
//! RECEIVED -> FILTERED -> (SCANNED) -> HASHED -> DEDUP_CHECKED -> COMMITTED
//!                  |            |          |             |
//!               REJECTED    REJECTED   REJECTED      REJECTED
//! ```
//!
//! Any rejection unlinks that file's bytes; the scan stage is batch-fatal
//! and unlinks every file written so far. Files in one batch are processed
//! concurrently, bounded by the files-per-request cap; the scan stage runs
//! sequentially to bound load on the scanner.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use stashbin_catalog::{current_epoch_seconds, Catalog, NewObject};
use stashbin_common::{hash_bytes, hash_file, parse_extension, url_extension, Extension};

use crate::age;
use crate::assemble;
use crate::chunks::{part_name, ChunkSessionStore};
use crate::error::IngestError;
use crate::fetch::{ContentFetcher, FetchedContent};
use crate::naming::NameAllocator;
use crate::options::{FilterOptions, IngestOptions, IMAGE_EXTS, VIDEO_EXTS};
use crate::scan::{parse_verdict, ScanOutcome, Scanner, VerdictMarkers};
use crate::traits::{CacheInvalidator, CacheKind, Thumbnailer};

// ============================================================================
// Request types
// ============================================================================

/// Request-scoped identity and transport facts, normalized once at the
/// transport boundary.
#[derive(Debug, Clone, Default)]
pub struct UploadContext {
    /// Authenticated user, None for anonymous uploads.
    pub owner_id: Option<i64>,
    /// Client source IP; only recorded when policy says so.
    pub ip: Option<String>,
}

/// A whole file received directly in the request body.
#[derive(Debug, Clone)]
pub struct DirectFile {
    /// File bytes.
    pub data: Vec<u8>,
    /// Client-supplied filename.
    pub original: String,
    /// Declared MIME type.
    pub mime: String,
    /// Requested album association.
    pub album_id: Option<i64>,
    /// Requested retention in hours.
    pub age_hours: Option<f64>,
    /// Requested identifier length (honored only when policy allows).
    pub name_length: Option<usize>,
}

/// One chunk of an in-progress chunked upload. Accumulate-only: no
/// pipeline processing happens until the client sends a chunk-finish.
#[derive(Debug, Clone)]
pub struct ChunkPart {
    /// Client-generated session token.
    pub session_id: String,
    /// Zero-based chunk index within the upload sequence.
    pub index: usize,
    /// Chunk bytes.
    pub data: Vec<u8>,
}

/// One logical file being finalized from previously uploaded chunks.
#[derive(Debug, Clone)]
pub struct ChunkFinishEntry {
    /// Session token the chunks were uploaded under.
    pub session_id: String,
    /// Client-supplied filename.
    pub original: String,
    /// Client-declared total size; must match the assembled size.
    pub declared_size: u64,
    /// Declared MIME type.
    pub mime: String,
    /// Requested album association.
    pub album_id: Option<i64>,
    /// Requested retention in hours.
    pub age_hours: Option<f64>,
    /// Requested identifier length.
    pub name_length: Option<usize>,
}

/// A URL to fetch server-side and ingest.
#[derive(Debug, Clone)]
pub struct RemoteUrl {
    /// The remote URL.
    pub url: String,
    /// Requested album association.
    pub album_id: Option<i64>,
    /// Requested retention in hours.
    pub age_hours: Option<f64>,
    /// Requested identifier length.
    pub name_length: Option<usize>,
}

// ============================================================================
// Response types
// ============================================================================

/// One accepted upload in a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    /// Stored name (identifier stem + extension).
    pub name: String,
    /// Public URL of the stored object.
    pub url: String,
    /// Original client-supplied name (or URL tail for remote uploads).
    pub original: String,
    /// Expiry timestamp for temporary uploads, epoch seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Per-file result in a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FileOutcome {
    /// File committed (or satisfied by dedup).
    Accepted(UploadedFile),
    /// File rejected; description is safe to show to the client.
    Rejected {
        /// User-visible failure description.
        error: String,
    },
}

impl FileOutcome {
    /// Whether this file was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, FileOutcome::Accepted(_))
    }

    /// The accepted payload, if any.
    pub fn accepted(&self) -> Option<&UploadedFile> {
        match self {
            FileOutcome::Accepted(file) => Some(file),
            FileOutcome::Rejected { .. } => None,
        }
    }

    /// The rejection description, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            FileOutcome::Accepted(_) => None,
            FileOutcome::Rejected { error } => Some(error),
        }
    }
}

/// Whole-request result.
///
/// A partial-batch failure (some files ok, some rejected) is `Completed`
/// with a mixed result list; only batch-fatal conditions (scan-positive,
/// malformed request shape) produce `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Per-file results, in request order.
    Completed {
        /// One outcome per logical upload.
        files: Vec<FileOutcome>,
    },
    /// The whole request was aborted.
    Failed {
        /// User-visible description.
        description: String,
    },
}

impl BatchOutcome {
    /// Whether the whole request was aborted.
    pub fn is_failed(&self) -> bool {
        matches!(self, BatchOutcome::Failed { .. })
    }

    /// Per-file outcomes (empty for failed batches).
    pub fn files(&self) -> &[FileOutcome] {
        match self {
            BatchOutcome::Completed { files } => files,
            BatchOutcome::Failed { .. } => &[],
        }
    }

    /// Wire shape: `{success, files[]}` or `{success: false, description}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BatchOutcome::Completed { files } => serde_json::json!({
                "success": true,
                "files": files,
            }),
            BatchOutcome::Failed { description } => serde_json::json!({
                "success": false,
                "description": description,
            }),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Owns a staged file's bytes and identifier reservation until commit.
///
/// One mechanism covers every abandonment path: explicit rejections,
/// batch-fatal scan verdicts, catalog failures, and futures dropped
/// mid-flight when the client disconnects all unlink the file and release
/// the stem when the guard drops. `disarm` is called once the catalog row
/// is committed.
struct StagedGuard {
    /// On-disk path in the storage root.
    path: PathBuf,
    /// Identifier stem reserved for this file.
    stem: String,
    /// Allocator the stem is returned to.
    allocator: Arc<NameAllocator>,
    armed: bool,
}

impl StagedGuard {
    fn new(path: PathBuf, stem: String, allocator: Arc<NameAllocator>) -> Self {
        Self {
            path,
            stem,
            allocator,
            armed: true,
        }
    }

    /// The file is committed; the bytes and the stem stay.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagedGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Drop cannot await; the unlink is a single synchronous syscall.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to unlink {}: {}", self.path.display(), e);
            }
        }
        self.allocator.release(&self.stem);
    }
}

/// A file that has passed the filter stage and is written to storage,
/// awaiting scan/dedup/commit. Its bytes and stem are owned by `guard`.
struct Staged {
    guard: StagedGuard,
    /// Stored name.
    name: String,
    /// Original client-supplied name.
    original: String,
    /// Declared MIME type.
    mime: String,
    /// Actual byte size on disk.
    size: u64,
    /// XXH128 content hash.
    hash: String,
    /// Requested album association (ownership not yet verified).
    album_id: Option<i64>,
    /// Resolved retention (None = permanent).
    age_hours: Option<f64>,
    /// Filter key of the classified extension, for thumbnail eligibility.
    filter_key: String,
}

/// Top-level coordinator for upload ingestion.
///
/// Constructed once at startup with its collaborators and shared by
/// reference; all mutable state (identifier cache, chunk sessions) lives
/// in explicitly owned service objects inside it.
pub struct IngestPipeline {
    options: IngestOptions,
    allocator: Arc<NameAllocator>,
    chunks: ChunkSessionStore,
    fetcher: ContentFetcher,
    catalog: Arc<dyn Catalog>,
    scanner: Option<Arc<dyn Scanner>>,
    markers: VerdictMarkers,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
    invalidator: Option<Arc<dyn CacheInvalidator>>,
}

impl IngestPipeline {
    /// Create a pipeline over the given catalog.
    ///
    /// # Arguments
    /// * `options` - Engine configuration
    /// * `catalog` - Metadata catalog
    pub fn new(options: IngestOptions, catalog: Arc<dyn Catalog>) -> Self {
        let allocator: Arc<NameAllocator> = Arc::new(NameAllocator::new(
            &options.storage_root,
            options.naming.clone(),
        ));
        let chunks: ChunkSessionStore =
            ChunkSessionStore::new(&options.chunk_root, options.chunking.clone());
        let mut fetcher: ContentFetcher = ContentFetcher::new();
        if let Some(ref template) = options.remote.proxy_template {
            fetcher = fetcher.with_proxy_template(template.clone());
        }
        Self {
            options,
            allocator,
            chunks,
            fetcher,
            catalog,
            scanner: None,
            markers: VerdictMarkers::default(),
            thumbnailer: None,
            invalidator: None,
        }
    }

    /// Configure a malware scanner; scanning is skipped when unset.
    pub fn with_scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Override the scanner's verdict markers.
    pub fn with_verdict_markers(mut self, markers: VerdictMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Configure the thumbnail collaborator.
    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    /// Configure the cache invalidation collaborator.
    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// The chunk session store (for stale sweeps by the embedding app).
    pub fn chunk_store(&self) -> &ChunkSessionStore {
        &self.chunks
    }

    /// The identifier allocator (for releasing stems on object deletion).
    pub fn allocator(&self) -> &NameAllocator {
        &self.allocator
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Ingest a batch of direct (whole-body) file uploads.
    pub async fn ingest_direct(
        &self,
        ctx: &UploadContext,
        files: Vec<DirectFile>,
    ) -> BatchOutcome {
        if let Some(failed) = self.check_batch_shape(files.len()) {
            return failed;
        }

        let staged: Vec<Result<Staged, IngestError>> = stream::iter(files)
            .map(|file| self.stage_direct(file))
            .buffered(self.options.max_files_per_batch.max(1))
            .collect()
            .await;

        self.finalize_batch(ctx, staged).await
    }

    /// Receive one chunk of a chunked upload. Accumulate-only.
    ///
    /// Chunks of the same session may arrive concurrently; part names are
    /// assigned from the client's chunk index so that lexical sort
    /// reconstructs upload order regardless of arrival order.
    pub async fn receive_chunk(&self, part: ChunkPart) -> Result<(), IngestError> {
        if part.index >= self.options.chunking.max_chunks {
            return Err(IngestError::TooManyChunks {
                max: self.options.chunking.max_chunks,
            });
        }

        let dir: PathBuf = self.chunks.open_session(&part.session_id).await?;
        let name: String = part_name(part.index);
        let path: PathBuf = dir.join(&name);
        tokio::fs::write(&path, &part.data)
            .await
            .map_err(|e| IngestError::io(path.display().to_string(), e))?;

        if let Err(e) = self
            .chunks
            .append_chunk(&part.session_id, &name, part.data.len() as u64)
            .await
        {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        Ok(())
    }

    /// Finalize previously uploaded chunk sessions into stored objects.
    pub async fn finish_chunks(
        &self,
        ctx: &UploadContext,
        entries: Vec<ChunkFinishEntry>,
    ) -> BatchOutcome {
        if let Some(failed) = self.check_batch_shape(entries.len()) {
            return failed;
        }

        let staged: Vec<Result<Staged, IngestError>> = stream::iter(entries)
            .map(|entry| self.stage_finish(entry))
            .buffered(self.options.max_files_per_batch.max(1))
            .collect()
            .await;

        self.finalize_batch(ctx, staged).await
    }

    /// Ingest a batch of remote URLs.
    pub async fn ingest_urls(&self, ctx: &UploadContext, urls: Vec<RemoteUrl>) -> BatchOutcome {
        if let Some(failed) = self.check_batch_shape(urls.len()) {
            return failed;
        }

        let staged: Vec<Result<Staged, IngestError>> = stream::iter(urls)
            .map(|url| self.stage_remote(url))
            .buffered(self.options.max_files_per_batch.max(1))
            .collect()
            .await;

        self.finalize_batch(ctx, staged).await
    }

    // ------------------------------------------------------------------
    // Staging (RECEIVED -> FILTERED -> HASHED, bytes on disk)
    // ------------------------------------------------------------------

    /// Batch-fatal request shape checks.
    fn check_batch_shape(&self, count: usize) -> Option<BatchOutcome> {
        if count == 0 {
            return Some(BatchOutcome::Failed {
                description: "No files supplied".to_string(),
            });
        }
        if count > self.options.max_files_per_batch {
            let err = IngestError::TooManyFiles {
                max: self.options.max_files_per_batch,
            };
            return Some(BatchOutcome::Failed {
                description: err.to_string(),
            });
        }
        None
    }

    /// Allocate a stored name off the async path.
    ///
    /// Allocation may touch the storage directory (cache population,
    /// probe mode), so it runs on the blocking pool.
    async fn allocate_name(&self, length: usize, extension: &str) -> Result<String, IngestError> {
        let allocator: Arc<NameAllocator> = Arc::clone(&self.allocator);
        let extension: String = extension.to_string();
        tokio::task::spawn_blocking(move || allocator.allocate(length, &extension))
            .await
            .map_err(|e| {
                IngestError::io(
                    self.options.storage_root.display().to_string(),
                    std::io::Error::new(std::io::ErrorKind::Other, e),
                )
            })?
    }

    /// Build the cleanup guard for a freshly allocated name.
    fn stage_guard(&self, name: &str) -> StagedGuard {
        StagedGuard::new(
            self.options.storage_root.join(name),
            stem_of(name).to_string(),
            Arc::clone(&self.allocator),
        )
    }

    async fn stage_direct(&self, file: DirectFile) -> Result<Staged, IngestError> {
        let age_hours: Option<f64> = age::resolve_age(&self.options.retention, file.age_hours)?;

        let ext: Extension = parse_extension(&file.original);
        check_filter(&self.options.filter, &ext)?;

        // Nothing is written yet, so rejection here has nothing to unlink.
        if file.data.is_empty() && self.options.filter.reject_empty_files {
            return Err(IngestError::EmptyFile);
        }
        if file.data.len() as u64 > self.options.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                limit_mb: self.options.max_file_mb(),
            });
        }

        let length: usize = self.allocator.resolve_length(file.name_length);
        let name: String = self.allocate_name(length, &ext.suffix).await?;
        // From here on the guard owns the bytes and the stem; every early
        // return (and a dropped future) cleans both up.
        let guard: StagedGuard = self.stage_guard(&name);

        // Bytes are already in memory, so hash before the write.
        let hash: String = hash_bytes(&file.data);
        tokio::fs::write(&guard.path, &file.data)
            .await
            .map_err(|e| IngestError::io(guard.path.display().to_string(), e))?;

        Ok(Staged {
            guard,
            name,
            original: file.original,
            mime: file.mime,
            size: file.data.len() as u64,
            hash,
            album_id: file.album_id,
            age_hours,
            filter_key: ext.filter_key,
        })
    }

    async fn stage_finish(&self, entry: ChunkFinishEntry) -> Result<Staged, IngestError> {
        let result: Result<Staged, IngestError> = self.stage_finish_inner(&entry).await;
        // The session is destroyed on success and on every failure path,
        // even when the error is unrelated to a specific chunk.
        self.chunks.discard_session(&entry.session_id).await;
        result
    }

    async fn stage_finish_inner(&self, entry: &ChunkFinishEntry) -> Result<Staged, IngestError> {
        let age_hours: Option<f64> = age::resolve_age(&self.options.retention, entry.age_hours)?;

        let ext: Extension = parse_extension(&entry.original);
        check_filter(&self.options.filter, &ext)?;

        let tracked: u64 = self.chunks.total_bytes(&entry.session_id).await?;
        if tracked == 0 && self.options.filter.reject_empty_files {
            return Err(IngestError::EmptyFile);
        }
        if tracked > self.options.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                limit_mb: self.options.max_file_mb(),
            });
        }

        let length: usize = self.allocator.resolve_length(entry.name_length);
        let name: String = self.allocate_name(length, &ext.suffix).await?;
        let guard: StagedGuard = self.stage_guard(&name);

        assemble::assemble(&self.chunks, &entry.session_id, &guard.path).await?;

        // The session's tracked total is authoritative for what was
        // received; the client's declared size must agree with it too.
        assemble::verify_size(&guard.path, tracked).await?;
        if entry.declared_size != tracked {
            return Err(IngestError::ChunkSizeMismatch {
                expected: entry.declared_size,
                actual: tracked,
            });
        }

        let hash: String = self.hash_on_disk(&guard.path).await?;

        Ok(Staged {
            guard,
            name,
            original: entry.original.clone(),
            mime: entry.mime.clone(),
            size: tracked,
            hash,
            album_id: entry.album_id,
            age_hours,
            filter_key: ext.filter_key,
        })
    }

    async fn stage_remote(&self, request: RemoteUrl) -> Result<Staged, IngestError> {
        let url: &str = request.url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(IngestError::RemoteUrlInvalid);
        }

        let age_hours: Option<f64> = age::resolve_age(&self.options.retention, request.age_hours)?;

        let ext: Extension = url_extension(url);
        let filter: &FilterOptions = self
            .options
            .remote
            .filter
            .as_ref()
            .unwrap_or(&self.options.filter);
        check_filter(filter, &ext)?;

        let length: usize = self.allocator.resolve_length(request.name_length);
        let name: String = self.allocate_name(length, &ext.suffix).await?;
        let guard: StagedGuard = self.stage_guard(&name);

        // The fetcher unlinks its own partial bytes on failure; the guard
        // still releases the stem.
        let fetched: FetchedContent = self
            .fetcher
            .fetch_to_file(url, &guard.path, self.options.remote.max_bytes)
            .await?;

        if fetched.bytes_written == 0 && filter.reject_empty_files {
            return Err(IngestError::EmptyFile);
        }

        let hash: String = self.hash_on_disk(&guard.path).await?;

        Ok(Staged {
            guard,
            name,
            original: url_tail(url),
            mime: fetched.mime,
            size: fetched.bytes_written,
            hash,
            album_id: request.album_id,
            age_hours,
            filter_key: ext.filter_key,
        })
    }

    /// Read-through hash of a file already fully on disk.
    async fn hash_on_disk(&self, path: &PathBuf) -> Result<String, IngestError> {
        let hash_path: PathBuf = path.clone();
        tokio::task::spawn_blocking(move || hash_file(&hash_path))
            .await
            .map_err(|e| {
                IngestError::io(
                    path.display().to_string(),
                    std::io::Error::new(std::io::ErrorKind::Other, e),
                )
            })?
            .map_err(|e| IngestError::io(path.display().to_string(), e))
    }

    // ------------------------------------------------------------------
    // SCANNED -> DEDUP_CHECKED -> COMMITTED
    // ------------------------------------------------------------------

    async fn finalize_batch(
        &self,
        ctx: &UploadContext,
        staged: Vec<Result<Staged, IngestError>>,
    ) -> BatchOutcome {
        if let Some(failed) = self.scan_batch(&staged).await {
            // Dropping `staged` here unlinks every file in the batch.
            return failed;
        }

        let now: i64 = current_epoch_seconds();
        let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(staged.len());
        let mut to_insert: Vec<NewObject> = Vec::new();
        let mut insert_slots: Vec<usize> = Vec::new();
        let mut guards: Vec<StagedGuard> = Vec::new();
        let mut thumb_candidates: Vec<(String, String)> = Vec::new();

        for result in staged {
            let file: Staged = match result {
                Ok(file) => file,
                Err(e) => {
                    outcomes.push(self.rejected(e));
                    continue;
                }
            };

            // DEDUP_CHECKED: same owner, same hash, exact byte size.
            let duplicate = match self
                .catalog
                .find_duplicate(ctx.owner_id, &file.hash, file.size)
                .await
            {
                Ok(duplicate) => duplicate,
                Err(e) => {
                    // The guard unlinks the staged bytes on drop.
                    outcomes.push(self.rejected(e.into()));
                    continue;
                }
            };

            if let Some(existing) = duplicate {
                // Dropping the guard discards the new bytes and frees the
                // stem; the response reuses the existing object.
                log::debug!("Dedup hit: {} -> {}", file.original, existing.name);
                outcomes.push(FileOutcome::Accepted(self.uploaded(
                    existing.name,
                    file.original,
                    existing.expires_at,
                )));
                continue;
            }

            // COMMITTED: verify album ownership; a failed check silently
            // drops the association, never the upload.
            let album_id: Option<i64> = match file.album_id {
                Some(id) => match self.catalog.album_owned_by(id, ctx.owner_id).await {
                    Ok(true) => Some(id),
                    Ok(false) => {
                        log::debug!("Dropping album {} association: ownership check failed", id);
                        None
                    }
                    Err(e) => {
                        log::warn!("Album ownership check errored: {}", e);
                        None
                    }
                },
                None => None,
            };

            let expires_at: Option<i64> = age::expiry_epoch(file.age_hours, now);
            to_insert.push(NewObject {
                name: file.name.clone(),
                owner_id: ctx.owner_id,
                original: file.original.clone(),
                mime: file.mime.clone(),
                size: file.size,
                hash: file.hash.clone(),
                ip: if self.options.log_ip { ctx.ip.clone() } else { None },
                created_at: now,
                expires_at,
                album_id,
            });
            insert_slots.push(outcomes.len());
            outcomes.push(FileOutcome::Accepted(self.uploaded(
                file.name.clone(),
                file.original,
                expires_at,
            )));
            if is_thumbnail_type(&file.filter_key) {
                thumb_candidates.push((file.name, file.filter_key));
            }
            // The guard stays armed until the batch insert succeeds.
            guards.push(file.guard);
        }

        if !to_insert.is_empty() {
            match self.catalog.insert_objects(&to_insert).await {
                Ok(_) => {
                    for guard in &mut guards {
                        guard.disarm();
                    }
                    self.emit_side_effects(ctx, &to_insert, thumb_candidates).await;
                }
                Err(e) => {
                    log::error!("Catalog batch insert failed: {}", e);
                    // The still-armed guards unlink the files when they
                    // drop at the end of this function.
                    for slot in &insert_slots {
                        outcomes[*slot] = self.rejected(IngestError::Catalog(e.clone()));
                    }
                }
            }
        }

        BatchOutcome::Completed { files: outcomes }
    }

    /// SCANNED stage: sequential, batch-fatal on any non-clean verdict.
    async fn scan_batch(&self, staged: &[Result<Staged, IngestError>]) -> Option<BatchOutcome> {
        let scanner: &Arc<dyn Scanner> = self.scanner.as_ref()?;

        let files: Vec<&Staged> = staged.iter().filter_map(|r| r.as_ref().ok()).collect();
        for (index, file) in files.iter().enumerate() {
            let outcome: ScanOutcome = match scanner.scan_file(&file.guard.path).await {
                Ok(verdict) => parse_verdict(&verdict, &self.markers),
                Err(e) => {
                    log::error!("Malware scan transport failure: {}", e);
                    ScanOutcome::Error("scanner unavailable".to_string())
                }
            };

            match outcome {
                ScanOutcome::Clean => {}
                ScanOutcome::Threat(threat) => {
                    let more_unchecked: bool = index + 1 < files.len();
                    let err = IngestError::ScanPositive {
                        threat,
                        more_unchecked,
                    };
                    let description: String = if more_unchecked {
                        format!("{} (further files in this batch were left unchecked)", err)
                    } else {
                        err.to_string()
                    };
                    return Some(BatchOutcome::Failed { description });
                }
                ScanOutcome::Error(message) => {
                    let err = IngestError::ScanFailed { message };
                    return Some(BatchOutcome::Failed {
                        description: err.to_string(),
                    });
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Side effects
    // ------------------------------------------------------------------

    /// Fire-and-forget side effects after a successful batch insert.
    async fn emit_side_effects(
        &self,
        ctx: &UploadContext,
        inserted: &[NewObject],
        thumb_candidates: Vec<(String, String)>,
    ) {
        // Bump every distinct album actually referenced, invalidating any
        // public-page cache keyed by the edited-at timestamp.
        let mut albums: Vec<i64> = inserted.iter().filter_map(|o| o.album_id).collect();
        albums.sort_unstable();
        albums.dedup();
        if !albums.is_empty() {
            if let Err(e) = self.catalog.bump_album_edited_at(&albums).await {
                log::warn!("Album edited-at bump failed: {}", e);
            }
            self.spawn_invalidate(CacheKind::Albums);
        }
        self.spawn_invalidate(CacheKind::Uploads);
        // Owner-attributed commits also change per-user statistics.
        if ctx.owner_id.is_some() {
            self.spawn_invalidate(CacheKind::Users);
        }

        if let Some(ref invalidator) = self.invalidator {
            let invalidator: Arc<dyn CacheInvalidator> = Arc::clone(invalidator);
            let names: Vec<String> = inserted.iter().map(|o| o.name.clone()).collect();
            tokio::spawn(async move {
                if let Err(e) = invalidator.purge_edge(&names).await {
                    log::warn!("Edge cache purge failed: {}", e);
                }
            });
        }

        if let Some(ref thumbnailer) = self.thumbnailer {
            for (name, ext) in thumb_candidates {
                let thumbnailer: Arc<dyn Thumbnailer> = Arc::clone(thumbnailer);
                tokio::spawn(async move {
                    if let Err(e) = thumbnailer.request_thumbnail(&name, &ext).await {
                        log::warn!("Thumbnail generation failed for {}: {}", name, e);
                    }
                });
            }
        }
    }

    fn spawn_invalidate(&self, kind: CacheKind) {
        if let Some(ref invalidator) = self.invalidator {
            let invalidator: Arc<dyn CacheInvalidator> = Arc::clone(invalidator);
            tokio::spawn(async move {
                if let Err(e) = invalidator.invalidate(kind).await {
                    log::warn!("Cache invalidation failed: {}", e);
                }
            });
        }
    }

    fn rejected(&self, err: IngestError) -> FileOutcome {
        let error: String = if err.is_user_visible() {
            err.to_string()
        } else {
            log::error!("Upload failed: {}", err);
            "An unexpected error occurred, try again later".to_string()
        };
        FileOutcome::Rejected { error }
    }

    fn uploaded(&self, name: String, original: String, expires_at: Option<i64>) -> UploadedFile {
        let base: &str = self.options.base_url.trim_end_matches('/');
        let url: String = if base.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", base, name)
        };
        UploadedFile {
            name,
            url,
            original,
            expires_at,
        }
    }
}

/// Evaluate the extension filter for a classified extension.
fn check_filter(filter: &FilterOptions, ext: &Extension) -> Result<(), IngestError> {
    if ext.is_empty() {
        if filter.allow_no_extension {
            return Ok(());
        }
        return Err(IngestError::ExtensionMissing);
    }
    if filter.allows(&ext.filter_key) {
        Ok(())
    } else {
        Err(IngestError::ExtensionBlocked {
            ext: ext.filter_key.clone(),
        })
    }
}

/// Whether the extension is an image or video type eligible for
/// thumbnail generation.
fn is_thumbnail_type(filter_key: &str) -> bool {
    IMAGE_EXTS.iter().any(|e| *e == filter_key) || VIDEO_EXTS.iter().any(|e| *e == filter_key)
}

/// The stem of a stored name: everything before the first dot.
fn stem_of(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Last non-empty path segment of a URL, for the "original name" response
/// field; falls back to the URL itself when no segment exists.
fn url_tail(url: &str) -> String {
    let without_fragment: &str = url.split('#').next().unwrap_or(url);
    let without_query: &str = without_fragment.split('?').next().unwrap_or(without_fragment);
    without_query
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(without_query)
        .to_string()
}
