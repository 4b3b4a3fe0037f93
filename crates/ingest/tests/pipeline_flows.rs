//! End-to-end pipeline flows over a real temp directory and an in-memory
//! catalog: direct uploads, chunked reassembly, remote URLs, scanning,
//! retention, and dedup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use stashbin_catalog::{Catalog, CatalogError, NewObject, SqliteCatalog, StoredObject};
use stashbin_ingest::{
    BatchOutcome, CacheInvalidator, CacheKind, ChunkFinishEntry, ChunkPart, DirectFile,
    IngestError, IngestOptions, IngestPipeline, RemoteUrl, RetentionOptions, Scanner,
    UploadContext,
};

struct Harness {
    pipeline: IngestPipeline,
    catalog: Arc<SqliteCatalog>,
    storage: PathBuf,
    // Owns the temp tree for the test's lifetime.
    _dir: tempfile::TempDir,
}

fn harness_with(options_fn: impl FnOnce(IngestOptions) -> IngestOptions) -> Harness {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let storage: PathBuf = dir.path().join("storage");
    let chunks: PathBuf = dir.path().join("chunks");
    std::fs::create_dir_all(&storage).unwrap();
    std::fs::create_dir_all(&chunks).unwrap();

    let options: IngestOptions =
        options_fn(IngestOptions::new(&storage, &chunks).with_base_url("https://files.test"));
    let catalog: Arc<SqliteCatalog> = Arc::new(SqliteCatalog::open_in_memory().unwrap());
    let pipeline: IngestPipeline = IngestPipeline::new(options, catalog.clone());

    Harness {
        pipeline,
        catalog,
        storage,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(|options| options)
}

fn direct(data: &[u8], original: &str) -> DirectFile {
    DirectFile {
        data: data.to_vec(),
        original: original.to_string(),
        mime: "application/octet-stream".to_string(),
        album_id: None,
        age_hours: None,
        name_length: None,
    }
}

fn stored_files(storage: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(storage)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Scanner that answers from a scripted verdict list, in order.
struct ScriptedScanner {
    verdicts: std::sync::Mutex<Vec<String>>,
}

impl ScriptedScanner {
    fn new(verdicts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            verdicts: std::sync::Mutex::new(verdicts.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl Scanner for ScriptedScanner {
    async fn scan_file(&self, _path: &Path) -> Result<String, IngestError> {
        let mut verdicts = self.verdicts.lock().unwrap();
        if verdicts.is_empty() {
            Ok("stream: OK".to_string())
        } else {
            Ok(verdicts.remove(0))
        }
    }
}

/// Catalog whose dedup lookup never answers, standing in for a slow
/// database while the client goes away.
struct ParkedCatalog;

#[async_trait]
impl Catalog for ParkedCatalog {
    async fn insert_objects(&self, _objects: &[NewObject]) -> Result<Vec<i64>, CatalogError> {
        Ok(Vec::new())
    }

    async fn find_duplicate(
        &self,
        _owner_id: Option<i64>,
        _hash: &str,
        _size: u64,
    ) -> Result<Option<StoredObject>, CatalogError> {
        std::future::pending().await
    }

    async fn find_by_name(&self, _name: &str) -> Result<Option<StoredObject>, CatalogError> {
        Ok(None)
    }

    async fn album_owned_by(
        &self,
        _album_id: i64,
        _owner_id: Option<i64>,
    ) -> Result<bool, CatalogError> {
        Ok(false)
    }

    async fn bump_album_edited_at(&self, _album_ids: &[i64]) -> Result<(), CatalogError> {
        Ok(())
    }

    async fn delete_object(&self, _name: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}

/// Records every cache invalidation the pipeline emits.
#[derive(Default)]
struct RecordingInvalidator {
    kinds: std::sync::Mutex<Vec<CacheKind>>,
    purged: std::sync::Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    fn kinds(&self) -> Vec<CacheKind> {
        self.kinds.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, kind: CacheKind) -> Result<(), IngestError> {
        self.kinds.lock().unwrap().push(kind);
        Ok(())
    }

    async fn purge_edge(&self, names: &[String]) -> Result<(), IngestError> {
        self.purged.lock().unwrap().extend(names.iter().cloned());
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Direct uploads
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_direct_upload_commits_and_serves_url() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = h
        .pipeline
        .ingest_direct(&ctx, vec![direct(b"hello world", "greeting.txt")])
        .await;

    assert!(!outcome.is_failed());
    let file = outcome.files()[0].accepted().expect("accepted");
    assert!(file.name.ends_with(".txt"));
    assert_eq!(file.url, format!("https://files.test/{}", file.name));
    assert_eq!(file.original, "greeting.txt");
    assert_eq!(file.expires_at, None);

    // Bytes on disk, row in the catalog.
    let on_disk = std::fs::read(h.storage.join(&file.name)).unwrap();
    assert_eq!(on_disk, b"hello world");
    assert_eq!(h.catalog.object_count().unwrap(), 1);
}

#[tokio::test]
async fn test_zero_byte_upload_rejected_nothing_stored() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = h
        .pipeline
        .ingest_direct(&ctx, vec![direct(b"", "empty.txt")])
        .await;

    assert!(!outcome.is_failed());
    assert_eq!(
        outcome.files()[0].error(),
        Some("Empty files are not permitted")
    );
    assert!(stored_files(&h.storage).is_empty());
    assert_eq!(h.catalog.object_count().unwrap(), 0);
}

#[tokio::test]
async fn test_mixed_batch_partial_rejection() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = h
        .pipeline
        .ingest_direct(
            &ctx,
            vec![
                direct(b"fine", "ok.txt"),
                direct(b"", "empty.bin"),
                direct(b"also fine", "ok2.txt"),
            ],
        )
        .await;

    // Per-file outcomes in request order; one rejection does not fail the
    // batch.
    assert!(!outcome.is_failed());
    assert!(outcome.files()[0].is_accepted());
    assert!(!outcome.files()[1].is_accepted());
    assert!(outcome.files()[2].is_accepted());
    assert_eq!(h.catalog.object_count().unwrap(), 2);
}

#[tokio::test]
async fn test_batch_over_cap_is_request_fatal() {
    let h: Harness = harness_with(|options| options.with_max_files_per_batch(2));
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = h
        .pipeline
        .ingest_direct(
            &ctx,
            vec![
                direct(b"a", "a.txt"),
                direct(b"b", "b.txt"),
                direct(b"c", "c.txt"),
            ],
        )
        .await;

    assert!(outcome.is_failed());
    assert!(stored_files(&h.storage).is_empty());
}

// ----------------------------------------------------------------------
// Chunked uploads
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_chunked_out_of_order_reassembles_byte_identical() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    // Clients generate opaque session tokens; uuids pass the id charset.
    let session_id: String = uuid::Uuid::new_v4().to_string();

    // Five distinct chunks; the client sends them as 3,1,4,0,2.
    let parts: Vec<Vec<u8>> = (0u8..5)
        .map(|i| vec![b'a' + i; 1000 + i as usize])
        .collect();
    let expected: Vec<u8> = parts.concat();

    for index in [3usize, 1, 4, 0, 2] {
        h.pipeline
            .receive_chunk(ChunkPart {
                session_id: session_id.clone(),
                index,
                data: parts[index].clone(),
            })
            .await
            .unwrap();
    }

    let outcome: BatchOutcome = h
        .pipeline
        .finish_chunks(
            &ctx,
            vec![ChunkFinishEntry {
                session_id: session_id.clone(),
                original: "big.bin".to_string(),
                declared_size: expected.len() as u64,
                mime: "application/octet-stream".to_string(),
                album_id: None,
                age_hours: None,
                name_length: None,
            }],
        )
        .await;

    assert!(!outcome.is_failed());
    let file = outcome.files()[0].accepted().expect("accepted");
    let assembled = std::fs::read(h.storage.join(&file.name)).unwrap();
    assert_eq!(assembled, expected);

    // The session and its chunk directory are gone.
    assert_eq!(h.pipeline.chunk_store().session_count(), 0);
    assert!(!h.pipeline.chunk_store().root().join(&session_id).exists());
}

#[tokio::test]
async fn test_chunked_declared_size_mismatch_rejected() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    h.pipeline
        .receive_chunk(ChunkPart {
            session_id: "upload-2".to_string(),
            index: 0,
            data: b"0123456789".to_vec(),
        })
        .await
        .unwrap();

    let outcome: BatchOutcome = h
        .pipeline
        .finish_chunks(
            &ctx,
            vec![ChunkFinishEntry {
                session_id: "upload-2".to_string(),
                original: "short.bin".to_string(),
                declared_size: 11,
                mime: "application/octet-stream".to_string(),
                album_id: None,
                age_hours: None,
                name_length: None,
            }],
        )
        .await;

    assert!(!outcome.is_failed());
    let error: &str = outcome.files()[0].error().expect("rejected");
    assert!(error.contains("size mismatch"), "{}", error);

    // Session destroyed, nothing committed, no leftover bytes.
    assert_eq!(h.pipeline.chunk_store().session_count(), 0);
    assert!(stored_files(&h.storage).is_empty());
    assert_eq!(h.catalog.object_count().unwrap(), 0);
}

#[tokio::test]
async fn test_finish_unknown_session_rejected() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = h
        .pipeline
        .finish_chunks(
            &ctx,
            vec![ChunkFinishEntry {
                session_id: "never-opened".to_string(),
                original: "ghost.bin".to_string(),
                declared_size: 1,
                mime: "application/octet-stream".to_string(),
                album_id: None,
                age_hours: None,
                name_length: None,
            }],
        )
        .await;

    assert!(!outcome.is_failed());
    assert!(outcome.files()[0]
        .error()
        .unwrap()
        .contains("Unknown chunk session"));
}

// ----------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_scan_threat_is_batch_fatal_and_unlinks_everything() {
    let base: Harness = harness();
    let pipeline: IngestPipeline = {
        // Rebuild the pipeline with a scanner; second file is infected.
        let scanner = ScriptedScanner::new(&[
            "stream: OK",
            "stream: Eicar-Test-Signature FOUND",
        ]);
        IngestPipeline::new(
            IngestOptions::new(&base.storage, base.pipeline.chunk_store().root())
                .with_base_url("https://files.test"),
            base.catalog.clone(),
        )
        .with_scanner(scanner)
    };
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = pipeline
        .ingest_direct(
            &ctx,
            vec![
                direct(b"clean one", "a.txt"),
                direct(b"infected!!", "b.txt"),
                direct(b"never scanned", "c.txt"),
            ],
        )
        .await;

    match outcome {
        BatchOutcome::Failed { description } => {
            assert!(description.contains("Eicar-Test-Signature"), "{}", description);
            assert!(description.contains("unchecked"), "{}", description);
        }
        BatchOutcome::Completed { .. } => panic!("scan positive must fail the batch"),
    }

    // Every staged file was unlinked, including the clean ones.
    assert!(stored_files(&base.storage).is_empty());
    assert_eq!(base.catalog.object_count().unwrap(), 0);
}

#[tokio::test]
async fn test_clean_scan_commits_normally() {
    let base: Harness = harness();
    let pipeline: IngestPipeline = IngestPipeline::new(
        IngestOptions::new(&base.storage, base.pipeline.chunk_store().root())
            .with_base_url("https://files.test"),
        base.catalog.clone(),
    )
    .with_scanner(ScriptedScanner::new(&["stream: OK"]));
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = pipeline
        .ingest_direct(&ctx, vec![direct(b"benign", "a.txt")])
        .await;

    assert!(!outcome.is_failed());
    assert!(outcome.files()[0].is_accepted());
    assert_eq!(base.catalog.object_count().unwrap(), 1);
}

// ----------------------------------------------------------------------
// Retention
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_permanent_request_rejected_when_not_listed() {
    let h: Harness =
        harness_with(|options| options.with_retention(RetentionOptions::allow(&[24.0, 72.0])));
    let ctx: UploadContext = UploadContext::default();

    let mut file: DirectFile = direct(b"data", "doc.txt");
    file.age_hours = Some(0.0);
    let outcome: BatchOutcome = h.pipeline.ingest_direct(&ctx, vec![file]).await;

    assert_eq!(
        outcome.files()[0].error(),
        Some("Permanent uploads are not permitted")
    );
    assert!(stored_files(&h.storage).is_empty());
}

#[tokio::test]
async fn test_default_retention_sets_expiry() {
    let h: Harness =
        harness_with(|options| options.with_retention(RetentionOptions::allow(&[24.0, 72.0])));
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = h
        .pipeline
        .ingest_direct(&ctx, vec![direct(b"data", "doc.txt")])
        .await;

    let file = outcome.files()[0].accepted().expect("accepted");
    let expires_at: i64 = file.expires_at.expect("default retention applies");
    let now: i64 = stashbin_catalog::current_epoch_seconds();
    // 24 hours out, give or take test scheduling.
    assert!((expires_at - now - 24 * 3600).abs() < 60);
}

// ----------------------------------------------------------------------
// Dedup
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_upload_reuses_existing_object() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    let first: BatchOutcome = h
        .pipeline
        .ingest_direct(&ctx, vec![direct(b"same bytes", "one.txt")])
        .await;
    let first_name: String = first.files()[0].accepted().unwrap().name.clone();

    let second: BatchOutcome = h
        .pipeline
        .ingest_direct(&ctx, vec![direct(b"same bytes", "two.txt")])
        .await;
    let reused = second.files()[0].accepted().expect("dedup hit is accepted");

    // Same stored object; the response keeps the new original name.
    assert_eq!(reused.name, first_name);
    assert_eq!(reused.original, "two.txt");
    assert_eq!(h.catalog.object_count().unwrap(), 1);
    assert_eq!(stored_files(&h.storage), vec![first_name]);
}

#[tokio::test]
async fn test_different_owners_do_not_dedup() {
    let h: Harness = harness();

    let anon: UploadContext = UploadContext::default();
    let user: UploadContext = UploadContext {
        owner_id: Some(7),
        ip: None,
    };

    h.pipeline
        .ingest_direct(&anon, vec![direct(b"shared bytes", "a.txt")])
        .await;
    let outcome: BatchOutcome = h
        .pipeline
        .ingest_direct(&user, vec![direct(b"shared bytes", "b.txt")])
        .await;

    assert!(outcome.files()[0].is_accepted());
    // Dedup is per owner: both objects exist.
    assert_eq!(h.catalog.object_count().unwrap(), 2);
    assert_eq!(stored_files(&h.storage).len(), 2);
}

// ----------------------------------------------------------------------
// Remote URLs
// ----------------------------------------------------------------------

/// Serve one canned HTTP/1.1 response on a local port.
async fn spawn_one_shot(status: &str, body: &[u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response: String = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        String::from_utf8_lossy(body)
    );
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_url_batch_isolates_per_url_failures() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    let good: String = spawn_one_shot("200 OK", b"remote payload").await;
    let bad: String = spawn_one_shot("404 Not Found", b"nope").await;

    let request = |url: String| RemoteUrl {
        url,
        album_id: None,
        age_hours: None,
        name_length: None,
    };
    let outcome: BatchOutcome = h
        .pipeline
        .ingest_urls(
            &ctx,
            vec![
                request(format!("{}/asset.bin", good)),
                request(format!("{}/missing.bin", bad)),
            ],
        )
        .await;

    assert!(!outcome.is_failed());
    let accepted = outcome.files()[0].accepted().expect("good URL accepted");
    assert_eq!(accepted.original, "asset.bin");
    let error: &str = outcome.files()[1].error().expect("bad URL rejected");
    assert!(error.contains("404"), "{}", error);

    // Only the good URL's bytes on disk.
    assert_eq!(stored_files(&h.storage).len(), 1);
    assert_eq!(h.catalog.object_count().unwrap(), 1);
}

// ----------------------------------------------------------------------
// Abandoned requests
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_dropped_request_unlinks_staged_bytes() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let storage: PathBuf = dir.path().join("storage");
    let chunks: PathBuf = dir.path().join("chunks");
    std::fs::create_dir_all(&storage).unwrap();
    std::fs::create_dir_all(&chunks).unwrap();

    let pipeline: Arc<IngestPipeline> = Arc::new(IngestPipeline::new(
        IngestOptions::new(&storage, &chunks),
        Arc::new(ParkedCatalog),
    ));

    let task = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move {
            let ctx: UploadContext = UploadContext::default();
            pipeline
                .ingest_direct(&ctx, vec![direct(b"abandoned", "gone.txt")])
                .await
        }
    });

    // Wait until the file is staged and the task is parked in the dedup
    // lookup, then drop the request mid-flight.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while stored_files(&storage).is_empty() {
        assert!(std::time::Instant::now() < deadline, "file never staged");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    task.abort();
    let _ = task.await;

    // The staged bytes must not outlive the request.
    assert!(
        stored_files(&storage).is_empty(),
        "abandoned upload left bytes behind"
    );
}

// ----------------------------------------------------------------------
// Cache invalidation
// ----------------------------------------------------------------------

/// Poll until the recorded kinds satisfy `done`, or panic on timeout.
/// Invalidations are fire-and-forget, so the test must wait for the
/// spawned tasks.
async fn wait_for_kinds(recorder: &RecordingInvalidator, done: impl Fn(&[CacheKind]) -> bool) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let kinds: Vec<CacheKind> = recorder.kinds();
        if done(&kinds) {
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "expected invalidations never arrived: {:?}",
            kinds
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_owner_commit_invalidates_user_stats() {
    let base: Harness = harness();
    let recorder: Arc<RecordingInvalidator> = Arc::new(RecordingInvalidator::default());
    let pipeline: IngestPipeline = IngestPipeline::new(
        IngestOptions::new(&base.storage, base.pipeline.chunk_store().root())
            .with_base_url("https://files.test"),
        base.catalog.clone(),
    )
    .with_invalidator(recorder.clone());

    let ctx: UploadContext = UploadContext {
        owner_id: Some(7),
        ip: None,
    };
    let outcome: BatchOutcome = pipeline
        .ingest_direct(&ctx, vec![direct(b"mine", "owned.txt")])
        .await;
    let name: String = outcome.files()[0].accepted().unwrap().name.clone();

    wait_for_kinds(&recorder, |kinds| {
        kinds.contains(&CacheKind::Uploads) && kinds.contains(&CacheKind::Users)
    })
    .await;
    assert!(recorder.purged.lock().unwrap().contains(&name));
}

#[tokio::test]
async fn test_anonymous_commit_skips_user_stats() {
    let base: Harness = harness();
    let recorder: Arc<RecordingInvalidator> = Arc::new(RecordingInvalidator::default());
    let pipeline: IngestPipeline = IngestPipeline::new(
        IngestOptions::new(&base.storage, base.pipeline.chunk_store().root())
            .with_base_url("https://files.test"),
        base.catalog.clone(),
    )
    .with_invalidator(recorder.clone());

    let ctx: UploadContext = UploadContext::default();
    pipeline
        .ingest_direct(&ctx, vec![direct(b"anon", "drive-by.txt")])
        .await;

    wait_for_kinds(&recorder, |kinds| kinds.contains(&CacheKind::Uploads)).await;
    // Give any stray invalidation time to land before asserting absence.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!recorder.kinds().contains(&CacheKind::Users));
    assert!(!recorder.kinds().contains(&CacheKind::Albums));
}

#[tokio::test]
async fn test_url_bad_scheme_rejected() {
    let h: Harness = harness();
    let ctx: UploadContext = UploadContext::default();

    let outcome: BatchOutcome = h
        .pipeline
        .ingest_urls(
            &ctx,
            vec![RemoteUrl {
                url: "ftp://host/file.bin".to_string(),
                album_id: None,
                age_hours: None,
                name_length: None,
            }],
        )
        .await;

    assert_eq!(outcome.files()[0].error(), Some("Invalid remote URL"));
}
