//! Retention policy for temporary uploads.
//!
//! Pure decision logic, no I/O. The policy is an ordered list of allowed
//! retention periods in hours; the first entry is the default. Zero means
//! permanent retention and is only honored when explicitly listed.

use crate::error::IngestError;
use crate::options::RetentionOptions;

/// Resolve a client-requested retention period against the policy.
///
/// - No allowed list: temporary uploads are disabled; everything resolves
///   to permanent regardless of the request.
/// - Unspecified request: the first (default) list entry.
/// - `Some(0.0)`: permanent, only if 0 is explicitly listed; otherwise
///   `PermanentUploadsProhibited` - request-fatal for that file, not a
///   policy fallback.
/// - Any other value must appear in the list, else `RetentionNotAllowed`.
///
/// # Returns
/// `Ok(Some(hours))` for a temporary upload, `Ok(None)` for permanent.
pub fn resolve_age(
    policy: &RetentionOptions,
    requested: Option<f64>,
) -> Result<Option<f64>, IngestError> {
    if policy.allowed_hours.is_empty() {
        return Ok(None);
    }

    let hours: f64 = match requested {
        None => policy.allowed_hours[0],
        Some(hours) => {
            if !policy.allowed_hours.contains(&hours) {
                if hours == 0.0 {
                    return Err(IngestError::PermanentUploadsProhibited);
                }
                return Err(IngestError::RetentionNotAllowed { hours });
            }
            hours
        }
    };

    if hours == 0.0 {
        Ok(None)
    } else {
        Ok(Some(hours))
    }
}

/// Compute the expiry timestamp for a resolved retention period.
///
/// # Arguments
/// * `age_hours` - Resolved retention (None = permanent)
/// * `now` - Current time, epoch seconds
pub fn expiry_epoch(age_hours: Option<f64>, now: i64) -> Option<i64> {
    age_hours.map(|hours| now + (hours * 3600.0) as i64)
}
