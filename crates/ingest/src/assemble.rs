//! Chunk assembly: concatenating a session's parts into the final file.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader};

use crate::chunks::ChunkSessionStore;
use crate::error::IngestError;

/// Concatenate a session's chunks, in upload order, into `dest`.
///
/// Part names sort lexically into upload order; the destination is opened
/// once for append-only sequential writes and closed only after all parts
/// are written or an error occurs. Partial output on error is acceptable -
/// the caller must discard the session (and unlink `dest`) on every
/// failure path.
///
/// After assembly the caller re-measures `dest` and compares against the
/// session's tracked total; this function only streams bytes.
///
/// # Arguments
/// * `store` - Session store holding the part bookkeeping
/// * `session_id` - The session to assemble
/// * `dest` - Final file path
///
/// # Returns
/// Total bytes written.
pub async fn assemble(
    store: &ChunkSessionStore,
    session_id: &str,
    dest: &Path,
) -> Result<u64, IngestError> {
    let (dir, parts, _tracked) = store.parts_sorted(session_id).await?;

    let mut out: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dest)
        .await
        .map_err(|e| IngestError::io(dest.display().to_string(), e))?;

    let mut written: u64 = 0;
    for part in &parts {
        let part_path = dir.join(part);
        let file: File = File::open(&part_path)
            .await
            .map_err(|e| IngestError::io(part_path.display().to_string(), e))?;
        let mut reader: BufReader<File> = BufReader::new(file);
        written += tokio::io::copy_buf(&mut reader, &mut out)
            .await
            .map_err(|e| IngestError::io(part_path.display().to_string(), e))?;
    }

    out.flush()
        .await
        .map_err(|e| IngestError::io(dest.display().to_string(), e))?;
    Ok(written)
}

/// Measure the assembled file and verify it against the expected total.
///
/// # Errors
/// `ChunkSizeMismatch` on any difference. This is fatal for the upload:
/// the chunks are gone after assembly, so a fresh multi-chunk upload from
/// scratch is required.
pub async fn verify_size(dest: &Path, expected: u64) -> Result<u64, IngestError> {
    let metadata = tokio::fs::metadata(dest)
        .await
        .map_err(|e| IngestError::io(dest.display().to_string(), e))?;
    let actual: u64 = metadata.len();
    if actual != expected {
        return Err(IngestError::ChunkSizeMismatch { expected, actual });
    }
    Ok(actual)
}
