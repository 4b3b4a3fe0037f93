//! Remote URL content fetching.
//!
//! URL uploads are downloaded server-side under a hard size cap enforced
//! at the transport level: the transfer is aborted as soon as the running
//! total passes the limit, never buffered past it. Fetches can be routed
//! through a privacy proxy by substituting the URL into a configured
//! template before the request is issued.

use std::path::Path;

use futures::StreamExt;

use crate::error::IngestError;

/// Fallback MIME type when the remote server declares none.
const FALLBACK_MIME: &str = "application/octet-stream";

/// Result of a successful remote fetch.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// Bytes written to the destination file.
    pub bytes_written: u64,
    /// Declared MIME type from the Content-Type header, parameters
    /// stripped; `application/octet-stream` when absent.
    pub mime: String,
}

/// Size-capped streaming downloader for URL uploads.
pub struct ContentFetcher {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Optional proxy template with `{url}` / `{url-noprot}` placeholders.
    proxy_template: Option<String>,
}

impl ContentFetcher {
    /// Create a fetcher with a default client and no proxy.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            proxy_template: None,
        }
    }

    /// Route fetches through a proxy template.
    ///
    /// # Arguments
    /// * `template` - Template containing `{url}` (raw URL) and/or
    ///   `{url-noprot}` (protocol-stripped URL) placeholders
    pub fn with_proxy_template(mut self, template: impl Into<String>) -> Self {
        self.proxy_template = Some(template.into());
        self
    }

    /// Download a URL to a file, enforcing `max_bytes` mid-transfer.
    ///
    /// Partial bytes are unlinked on every failure path, so a failed fetch
    /// leaves nothing on disk.
    ///
    /// # Arguments
    /// * `url` - Remote URL (already validated by the caller)
    /// * `dest` - Destination file path
    /// * `max_bytes` - Transport-level size cap
    ///
    /// # Errors
    /// `RemoteFetchFailed` for non-200 responses, `FileTooLarge` when the
    /// cap is exceeded, `RemoteFetchError` for transport failures.
    pub async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<FetchedContent, IngestError> {
        let target: String = match self.proxy_template {
            Some(ref template) => apply_proxy_template(template, url),
            None => url.to_string(),
        };

        let response = self
            .client
            .get(&target)
            .send()
            .await
            .map_err(|e| IngestError::RemoteFetchError {
                message: e.to_string(),
            })?;

        let status: u16 = response.status().as_u16();
        if status != 200 {
            return Err(IngestError::RemoteFetchFailed { status });
        }

        let limit_mb: u64 = max_bytes / (1024 * 1024);

        // Reject early when the server declares an oversized body.
        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(IngestError::FileTooLarge { limit_mb });
            }
        }

        let mime: String = declared_mime(&response);

        let mut out = tokio::fs::File::create(dest)
            .await
            .map_err(|e| IngestError::io(dest.display().to_string(), e))?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(out);
                    unlink_quiet(dest).await;
                    return Err(IngestError::RemoteFetchError {
                        message: e.to_string(),
                    });
                }
            };

            written += chunk.len() as u64;
            if written > max_bytes {
                // Abort the transfer; do not buffer past the limit.
                drop(out);
                unlink_quiet(dest).await;
                return Err(IngestError::FileTooLarge { limit_mb });
            }

            if let Err(e) = tokio::io::AsyncWriteExt::write_all(&mut out, &chunk).await {
                drop(out);
                unlink_quiet(dest).await;
                return Err(IngestError::io(dest.display().to_string(), e));
            }
        }

        if let Err(e) = tokio::io::AsyncWriteExt::flush(&mut out).await {
            drop(out);
            unlink_quiet(dest).await;
            return Err(IngestError::io(dest.display().to_string(), e));
        }

        Ok(FetchedContent {
            bytes_written: written,
            mime,
        })
    }
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitute a URL into a proxy template.
///
/// `{url}` expands to the raw URL, `{url-noprot}` to the URL with its
/// protocol prefix stripped.
pub fn apply_proxy_template(template: &str, url: &str) -> String {
    template
        .replace("{url-noprot}", strip_protocol(url))
        .replace("{url}", url)
}

/// Strip the `scheme://` prefix from a URL, if present.
fn strip_protocol(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    }
}

/// Content-Type header with parameters stripped, or the fallback.
fn declared_mime(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// Best-effort unlink for partial downloads.
async fn unlink_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to unlink partial download {}: {}", path.display(), e);
        }
    }
}
