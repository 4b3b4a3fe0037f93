//! Malware scanner contract and verdict parsing.
//!
//! Scanning is optional: when a scanner is configured the pipeline submits
//! each candidate file sequentially (never in parallel, to bound load on
//! the scanner process) and any non-clean verdict is fatal for the whole
//! batch.

use std::path::Path;

use async_trait::async_trait;

use crate::error::IngestError;

/// Malware scanner collaborator - implemented elsewhere (e.g. a clamd
/// client); the engine only consumes verdict strings.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan a file on disk and return the raw verdict string.
    ///
    /// # Errors
    /// Transport-level failures reaching the scanner. A reachable scanner
    /// reporting a threat is not an error here; that is encoded in the
    /// verdict string.
    async fn scan_file(&self, path: &Path) -> Result<String, IngestError>;
}

/// Scanner-specific markers delimiting the threat name inside a verdict.
///
/// With the defaults, `"stream: Eicar-Test-Signature FOUND"` parses to the
/// threat `Eicar-Test-Signature` and `"stream: OK"` is clean.
#[derive(Debug, Clone)]
pub struct VerdictMarkers {
    /// Text before the threat name.
    pub prefix: String,
    /// Text after the threat name.
    pub suffix: String,
}

impl Default for VerdictMarkers {
    fn default() -> Self {
        Self {
            prefix: "stream: ".to_string(),
            suffix: " FOUND".to_string(),
        }
    }
}

/// Parsed scanner verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// File is clean.
    Clean,
    /// A threat was detected; carries the extracted threat name.
    Threat(String),
    /// The scanner answered with something unparsable (scanner error).
    Error(String),
}

/// Classify a raw verdict string.
///
/// A verdict ending in the OK marker is clean; a verdict carrying the
/// FOUND marker yields the threat label between the configured prefix and
/// suffix; anything else is a scanner error, reported with the raw text
/// (whitespace-trimmed) as a sanitized message.
pub fn parse_verdict(verdict: &str, markers: &VerdictMarkers) -> ScanOutcome {
    let trimmed: &str = verdict.trim();

    if trimmed.ends_with("OK") {
        return ScanOutcome::Clean;
    }

    if let Some(found_end) = trimmed.rfind(markers.suffix.as_str()) {
        let start: usize = match trimmed.find(markers.prefix.as_str()) {
            Some(idx) => idx + markers.prefix.len(),
            None => 0,
        };
        if start <= found_end {
            return ScanOutcome::Threat(trimmed[start..found_end].to_string());
        }
    }

    ScanOutcome::Error(trimmed.to_string())
}
