//! Filename extension classification.
//!
//! Extension handling is deceptively fiddly: filtering must be
//! case-insensitive, compound archive suffixes (`.tar.gz`) must classify as
//! one logical extension, and numbered multi-part archives (`.zip.001`)
//! must classify by the real extension while preserving the part number in
//! the stored name.

/// A classified filename extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Full lowercase suffix to append to the stored name,
    /// e.g. `.tar.gz` or `.zip.001`. Empty when the filename has no
    /// dot-extension.
    pub suffix: String,
    /// The extension used for filter decisions, e.g. `.tar.gz` for
    /// `backup.tar.gz` but `.zip` for `archive.zip.001`.
    pub filter_key: String,
}

impl Extension {
    /// An empty extension (filename without a dot-extension).
    pub fn empty() -> Self {
        Self {
            suffix: String::new(),
            filter_key: String::new(),
        }
    }

    /// Whether the filename had no usable extension at all.
    pub fn is_empty(&self) -> bool {
        self.suffix.is_empty()
    }
}

/// Classify the extension of a filename.
///
/// Rules, applied to the lowercased name:
/// 1. No `.` after the first character means no extension.
/// 2. A trailing numbered part suffix (`.001`, `.002`, ...) is split off
///    and re-appended after classification, so `archive.zip.001` filters
///    by `.zip` but stores as `.zip.001`.
/// 3. Compound tar suffixes (`.tar.<alnum>`) are kept whole, so
///    `backup.tar.gz` filters by `.tar.gz`, not `.gz`.
/// 4. Otherwise the extension is everything from the last `.`.
///
/// # Arguments
/// * `filename` - Client-supplied filename (not a path)
///
/// # Returns
/// The classified extension; `Extension::empty()` if none.
pub fn parse_extension(filename: &str) -> Extension {
    let lower: String = filename.to_lowercase();

    // A leading dot alone (".bashrc") is a hidden file, not an extension.
    if !has_inner_dot(&lower) {
        return Extension::empty();
    }

    let (base, multi): (&str, &str) = split_multi_part(&lower);

    // After stripping the part number the remainder may have no extension
    // left ("archive.001" -> "archive").
    if !has_inner_dot(base) {
        if multi.is_empty() {
            return Extension::empty();
        }
        return Extension {
            suffix: multi.to_string(),
            filter_key: multi.to_string(),
        };
    }

    let filter_key: String = match compound_suffix(base) {
        Some(compound) => compound.to_string(),
        None => {
            let dot: usize = base.rfind('.').unwrap_or(0);
            base[dot..].to_string()
        }
    };

    Extension {
        suffix: format!("{}{}", filter_key, multi),
        filter_key,
    }
}

/// Derive the extension of a remote URL's path component.
///
/// Query string and fragment are stripped before the last path segment is
/// classified with the same rules as direct uploads.
///
/// # Arguments
/// * `url` - The remote URL as supplied by the client
pub fn url_extension(url: &str) -> Extension {
    let without_fragment: &str = url.split('#').next().unwrap_or(url);
    let without_query: &str = without_fragment.split('?').next().unwrap_or(without_fragment);
    let last_segment: &str = without_query.rsplit('/').next().unwrap_or(without_query);
    parse_extension(last_segment)
}

/// Whether the name contains a `.` that can start an extension
/// (i.e. not only as the first character).
fn has_inner_dot(name: &str) -> bool {
    name.char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < name.len())
}

/// Split a trailing numbered multi-part suffix (".001" style) off the name.
///
/// Returns (base, multi) where multi is empty when no part suffix exists.
fn split_multi_part(lower: &str) -> (&str, &str) {
    if let Some(dot) = lower.rfind('.') {
        let tail: &str = &lower[dot + 1..];
        if dot > 0 && tail.len() == 3 && tail.chars().all(|c: char| c.is_ascii_digit()) {
            return (&lower[..dot], &lower[dot..]);
        }
    }
    (lower, "")
}

/// Detect compound suffixes that must be preserved whole (".tar.gz" etc).
fn compound_suffix(base: &str) -> Option<&str> {
    let dot: usize = base.rfind('.')?;
    let without_last: &str = &base[..dot];
    if without_last.ends_with(".tar") && base[dot + 1..].chars().all(|c: char| c.is_ascii_alphanumeric()) && !base[dot + 1..].is_empty() {
        let start: usize = without_last.len() - ".tar".len();
        return Some(&base[start..]);
    }
    None
}
