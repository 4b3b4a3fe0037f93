//! Content hash computation.
//!
//! Dedup keys are XXH128 digests: the hash only has to distinguish file
//! contents quickly, it is not an integrity or authenticity guarantee.

use std::io::Read;
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

/// Read buffer size for file hashing (64KB).
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Compute XXH128 hash of a byte slice.
///
/// # Arguments
/// * `data` - Bytes to hash
///
/// # Returns
/// 32-character lowercase hex string (128 bits).
pub fn hash_bytes(data: &[u8]) -> String {
    let hash: u128 = xxhash_rust::xxh3::xxh3_128(data);
    format!("{:032x}", hash)
}

/// Compute XXH128 hash of a file on disk.
///
/// Reads the file in chunks to avoid loading the entire file into memory.
/// Used for the chunked/URL ingestion paths where the bytes are already
/// fully on disk and a dedicated read-through pass is acceptable.
///
/// # Arguments
/// * `path` - Path to the file to hash
///
/// # Returns
/// 32-character lowercase hex string (128 bits).
///
/// # Errors
/// Returns error if file cannot be read.
pub fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file: std::fs::File = std::fs::File::open(path)?;
    let mut hasher: Xxh3Hasher = Xxh3Hasher::new();
    let mut buffer: Vec<u8> = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read: usize = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finish_hex())
}

/// Streaming hasher for incremental XXH128 hashing.
///
/// Used when the bytes arrive in pieces and buffering the whole input
/// just to hash it would be wasteful.
pub struct Xxh3Hasher {
    inner: Xxh3,
}

impl Xxh3Hasher {
    /// Create a new streaming hasher.
    pub fn new() -> Self {
        Self { inner: Xxh3::new() }
    }

    /// Update the hasher with additional data.
    ///
    /// # Arguments
    /// * `data` - Bytes to add to the hash computation
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the hash as u128.
    pub fn finish(&self) -> u128 {
        self.inner.digest128()
    }

    /// Finalize and return the hash as 32-char hex string.
    pub fn finish_hex(&self) -> String {
        format!("{:032x}", self.finish())
    }
}

impl Default for Xxh3Hasher {
    fn default() -> Self {
        Self::new()
    }
}
