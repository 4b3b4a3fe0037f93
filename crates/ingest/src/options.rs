//! Configuration options for the ingestion engine.
//!
//! One `IngestOptions` value is built at startup and handed to the
//! pipeline; nested structs group the per-concern policies.

use std::path::PathBuf;

/// Default per-file size cap (512 MB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 512 * 1024 * 1024;

/// Default cap on files per upload request.
pub const DEFAULT_MAX_FILES_PER_BATCH: usize = 20;

/// Default cap on remote URL download size (32 MB).
pub const DEFAULT_REMOTE_MAX_BYTES: u64 = 32 * 1024 * 1024;

/// Default identifier stem length.
pub const DEFAULT_NAME_LENGTH: usize = 12;

/// Default bound on identifier allocation retries.
pub const DEFAULT_NAME_MAX_TRIES: u32 = 10;

/// Default cap on chunks per session.
pub const DEFAULT_MAX_CHUNKS: usize = 1000;

/// Default idle age after which a chunk session is sweepable (6 hours).
pub const DEFAULT_CHUNK_STALE_SECS: u64 = 6 * 3600;

/// Extensions eligible for thumbnail generation: images.
pub const IMAGE_EXTS: &[&str] = &[
    ".webp", ".jpg", ".jpeg", ".gif", ".png", ".tiff", ".tif", ".svg",
];

/// Extensions eligible for thumbnail generation: videos.
pub const VIDEO_EXTS: &[&str] = &[".webm", ".mp4", ".wmv", ".avi", ".mov", ".mkv"];

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Directory where final stored objects live.
    pub storage_root: PathBuf,
    /// Directory where in-progress chunk sessions live.
    pub chunk_root: PathBuf,
    /// Base URL prefixed to stored names in responses.
    pub base_url: String,
    /// Per-file size cap in bytes.
    pub max_file_bytes: u64,
    /// Maximum files per upload request; also bounds batch parallelism.
    pub max_files_per_batch: usize,
    /// Whether to record the uploader's source IP on catalog rows.
    pub log_ip: bool,
    /// Extension filter policy for direct and chunked uploads.
    pub filter: FilterOptions,
    /// Identifier allocation policy.
    pub naming: NamingOptions,
    /// Chunked upload policy.
    pub chunking: ChunkOptions,
    /// Remote URL upload policy.
    pub remote: RemoteOptions,
    /// Temporary upload retention policy.
    pub retention: RetentionOptions,
}

impl IngestOptions {
    /// Create options rooted at the given storage and chunk directories.
    ///
    /// # Arguments
    /// * `storage_root` - Directory for final stored objects
    /// * `chunk_root` - Directory for chunk sessions
    pub fn new(storage_root: impl Into<PathBuf>, chunk_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            chunk_root: chunk_root.into(),
            base_url: String::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files_per_batch: DEFAULT_MAX_FILES_PER_BATCH,
            log_ip: false,
            filter: FilterOptions::default(),
            naming: NamingOptions::default(),
            chunking: ChunkOptions::default(),
            remote: RemoteOptions::default(),
            retention: RetentionOptions::default(),
        }
    }

    /// Set the base URL used in upload responses.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-file size cap.
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Set the files-per-request cap.
    pub fn with_max_files_per_batch(mut self, max: usize) -> Self {
        self.max_files_per_batch = max;
        self
    }

    /// Enable or disable IP logging on catalog rows.
    pub fn with_log_ip(mut self, log_ip: bool) -> Self {
        self.log_ip = log_ip;
        self
    }

    /// Set the extension filter policy.
    pub fn with_filter(mut self, filter: FilterOptions) -> Self {
        self.filter = filter;
        self
    }

    /// Set the identifier allocation policy.
    pub fn with_naming(mut self, naming: NamingOptions) -> Self {
        self.naming = naming;
        self
    }

    /// Set the chunked upload policy.
    pub fn with_chunking(mut self, chunking: ChunkOptions) -> Self {
        self.chunking = chunking;
        self
    }

    /// Set the remote URL upload policy.
    pub fn with_remote(mut self, remote: RemoteOptions) -> Self {
        self.remote = remote;
        self
    }

    /// Set the retention policy.
    pub fn with_retention(mut self, retention: RetentionOptions) -> Self {
        self.retention = retention;
        self
    }

    /// The per-file size cap expressed in whole megabytes, for messages.
    pub fn max_file_mb(&self) -> u64 {
        self.max_file_bytes / (1024 * 1024)
    }
}

/// Whether the filter list blocks or permits the listed extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Listed extensions are rejected; everything else passes.
    #[default]
    Blacklist,
    /// Only listed extensions pass.
    Whitelist,
}

/// Extension filter policy.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// List interpretation.
    pub mode: FilterMode,
    /// Lowercase extensions including the leading dot, e.g. `.exe`.
    pub list: Vec<String>,
    /// Whether filenames without any extension are accepted.
    /// Evaluated independently of the list.
    pub allow_no_extension: bool,
    /// Whether zero-byte uploads are rejected.
    pub reject_empty_files: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            mode: FilterMode::Blacklist,
            list: Vec::new(),
            allow_no_extension: true,
            reject_empty_files: true,
        }
    }
}

impl FilterOptions {
    /// Blacklist the given extensions.
    pub fn blacklist(list: &[&str]) -> Self {
        Self {
            mode: FilterMode::Blacklist,
            list: list.iter().map(|s| s.to_lowercase()).collect(),
            ..Self::default()
        }
    }

    /// Permit only the given extensions.
    pub fn whitelist(list: &[&str]) -> Self {
        Self {
            mode: FilterMode::Whitelist,
            list: list.iter().map(|s| s.to_lowercase()).collect(),
            ..Self::default()
        }
    }

    /// Set the empty-extension policy.
    pub fn with_allow_no_extension(mut self, allow: bool) -> Self {
        self.allow_no_extension = allow;
        self
    }

    /// Set the zero-byte-upload policy.
    pub fn with_reject_empty_files(mut self, reject: bool) -> Self {
        self.reject_empty_files = reject;
        self
    }

    /// Whether the given filter key passes this policy.
    ///
    /// The key must already be lowercase (as produced by
    /// `stashbin_common::parse_extension`); the empty key is governed by
    /// `allow_no_extension` alone.
    pub fn allows(&self, filter_key: &str) -> bool {
        if filter_key.is_empty() {
            return self.allow_no_extension;
        }
        let listed: bool = self.list.iter().any(|e| e == filter_key);
        match self.mode {
            FilterMode::Blacklist => !listed,
            FilterMode::Whitelist => listed,
        }
    }
}

/// Identifier allocation policy.
#[derive(Debug, Clone)]
pub struct NamingOptions {
    /// Stem length used when the client does not (or may not) choose one.
    pub default_length: usize,
    /// Smallest stem length a client may request.
    pub min_length: usize,
    /// Largest stem length a client may request.
    pub max_length: usize,
    /// Whether clients may request a length at all.
    pub user_changeable: bool,
    /// Hard cap on allocation retries before `AllocationExhausted`.
    pub max_tries: u32,
    /// Use the in-memory identifier cache (fast path) instead of probing
    /// the storage directory per candidate.
    pub cache_names: bool,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            default_length: DEFAULT_NAME_LENGTH,
            min_length: 4,
            max_length: 32,
            user_changeable: false,
            max_tries: DEFAULT_NAME_MAX_TRIES,
            cache_names: true,
        }
    }
}

impl NamingOptions {
    /// Allow clients to choose a stem length within [min, max].
    pub fn with_user_changeable(mut self, user_changeable: bool) -> Self {
        self.user_changeable = user_changeable;
        self
    }

    /// Set the default stem length.
    pub fn with_default_length(mut self, default_length: usize) -> Self {
        self.default_length = default_length;
        self
    }

    /// Toggle the in-memory identifier cache.
    pub fn with_cache_names(mut self, cache_names: bool) -> Self {
        self.cache_names = cache_names;
        self
    }
}

/// Chunked upload policy.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Maximum chunks per session.
    /// Must stay below 100000 so the zero-padded part names sort correctly.
    pub max_chunks: usize,
    /// Idle seconds after which `sweep_stale` may discard a session.
    pub stale_after_secs: u64,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunks: DEFAULT_MAX_CHUNKS,
            stale_after_secs: DEFAULT_CHUNK_STALE_SECS,
        }
    }
}

/// Remote URL upload policy.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Download size cap, enforced at the transport level.
    pub max_bytes: u64,
    /// Optional proxy template with `{url}` / `{url-noprot}` placeholders,
    /// substituted before the request is issued.
    pub proxy_template: Option<String>,
    /// Filter policy specific to URL ingestion. Falls back to the general
    /// filter when unset.
    pub filter: Option<FilterOptions>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_REMOTE_MAX_BYTES,
            proxy_template: None,
            filter: None,
        }
    }
}

impl RemoteOptions {
    /// Set the download size cap.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Route fetches through a proxy template.
    pub fn with_proxy_template(mut self, template: impl Into<String>) -> Self {
        self.proxy_template = Some(template.into());
        self
    }

    /// Use a URL-specific filter policy.
    pub fn with_filter(mut self, filter: FilterOptions) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Temporary upload retention policy.
#[derive(Debug, Clone, Default)]
pub struct RetentionOptions {
    /// Ordered list of allowed retention periods in hours; the first entry
    /// is the default. `0.0` means permanent and is only honored when
    /// explicitly listed. An empty list disables temporary uploads
    /// entirely (everything is permanent).
    pub allowed_hours: Vec<f64>,
}

impl RetentionOptions {
    /// Allow the given retention periods (first entry is the default).
    pub fn allow(hours: &[f64]) -> Self {
        Self {
            allowed_hours: hours.to_vec(),
        }
    }
}
