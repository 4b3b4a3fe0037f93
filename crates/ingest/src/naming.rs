//! Identifier allocation for stored objects.
//!
//! Stored names are random alphanumeric stems plus the original extension;
//! the stem must be unused. Confirmation is either a cache-set membership
//! check (fast path; insertion doubles as a race-free reservation) or an
//! existence probe of the exact candidate path in the storage directory
//! (authoritative, one stat per candidate).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::IngestError;
use crate::options::NamingOptions;

/// Collision-checked random name allocator.
///
/// One allocator is constructed at startup and shared by reference; the
/// identifier cache inside it is the only state it owns.
pub struct NameAllocator {
    /// Directory whose filenames define the identifier namespace.
    storage_root: PathBuf,
    /// Allocation policy.
    options: NamingOptions,
    /// Lazily populated set of stems known to be in use.
    /// None until first use in cache mode; unused in probe mode.
    cache: Mutex<Option<HashSet<String>>>,
}

impl NameAllocator {
    /// Create an allocator over the given storage directory.
    ///
    /// # Arguments
    /// * `storage_root` - Directory holding stored objects
    /// * `options` - Allocation policy
    pub fn new(storage_root: impl Into<PathBuf>, options: NamingOptions) -> Self {
        Self {
            storage_root: storage_root.into(),
            options,
            cache: Mutex::new(None),
        }
    }

    /// Resolve the stem length to use for a request.
    ///
    /// When the policy is not user-changeable the default length is always
    /// used regardless of client input; otherwise the requested length is
    /// clamped to the policy bounds.
    pub fn resolve_length(&self, requested: Option<usize>) -> usize {
        if !self.options.user_changeable {
            return self.options.default_length;
        }
        match requested {
            Some(len) => len.clamp(self.options.min_length, self.options.max_length),
            None => self.options.default_length,
        }
    }

    /// Allocate an unused stored name.
    ///
    /// Generates random stems until one is confirmed unused, bounded by the
    /// policy's retry cap.
    ///
    /// # Arguments
    /// * `length` - Stem length (already resolved via `resolve_length`)
    /// * `extension` - Suffix to append, including the leading dot (may be
    ///   empty)
    ///
    /// # Returns
    /// The full stored name, `stem + extension`.
    ///
    /// # Errors
    /// `AllocationExhausted` when the retry bound is reached. This is a
    /// hard stop; callers surface it as a user-visible error.
    pub fn allocate(&self, length: usize, extension: &str) -> Result<String, IngestError> {
        for _ in 0..self.options.max_tries {
            let stem: String = random_stem(length);
            let free: bool = if self.options.cache_names {
                self.reserve(&stem)?
            } else {
                !self.name_exists_on_disk(&format!("{}{}", stem, extension))
            };
            if free {
                return Ok(format!("{}{}", stem, extension));
            }
        }
        Err(IngestError::AllocationExhausted { length })
    }

    /// Release a stem reserved by `allocate`.
    ///
    /// Must be called when an upload fails after name allocation (and on
    /// object deletion), so abandoned identifiers do not stay reserved
    /// forever in cache mode. A no-op in probe mode.
    pub fn release(&self, stem: &str) {
        let mut guard = self.cache.lock().unwrap();
        if let Some(ref mut cache) = *guard {
            cache.remove(stem);
        }
    }

    /// Try to reserve a stem in the cache; returns false on collision.
    /// Cache mode only.
    fn reserve(&self, stem: &str) -> Result<bool, IngestError> {
        let mut guard = self.cache.lock().unwrap();
        let cache: &mut HashSet<String> = match *guard {
            Some(ref mut cache) => cache,
            None => {
                *guard = Some(self.scan_existing_stems()?);
                guard.as_mut().unwrap()
            }
        };
        // Insertion is the reservation; still holding the lock, so two
        // concurrent callers can never both claim the same stem.
        Ok(cache.insert(stem.to_string()))
    }

    /// Populate the cache from the storage directory listing.
    fn scan_existing_stems(&self) -> Result<HashSet<String>, IngestError> {
        let mut stems: HashSet<String> = HashSet::new();
        let entries = std::fs::read_dir(&self.storage_root)
            .map_err(|e| IngestError::io(self.storage_root.display().to_string(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| IngestError::io(self.storage_root.display().to_string(), e))?;
            let name: String = entry.file_name().to_string_lossy().into_owned();
            stems.insert(stem_of(&name).to_string());
        }
        Ok(stems)
    }

    /// Probe the storage directory for the exact candidate name.
    ///
    /// One stat per candidate regardless of how many objects are stored.
    /// The probe is per-name, not per-stem: the same stem under a
    /// different extension would not be caught, which for random stems is
    /// an accepted non-collision.
    fn name_exists_on_disk(&self, name: &str) -> bool {
        self.storage_root.join(name).exists()
    }

    /// The storage directory this allocator probes.
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }
}

/// Generate a random alphanumeric stem.
fn random_stem(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// The stem of a stored name: everything before the first dot.
///
/// Stems are alphanumeric and never contain dots, so this holds even for
/// compound suffixes like `.tar.gz`.
fn stem_of(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
