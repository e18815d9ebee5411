//! URL path normalization for low-cardinality handler labels.
//!
//! Raw request paths carry identifiers (`/orders/247643`, `/wallet/0xe25f...`)
//! that would create one metric series per resource. [`normalize_path`]
//! folds those identifiers so that every request to the same logical
//! endpoint shares a label.

use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder used in place of a trailing identifier segment.
pub const DETAIL_PLACEHOLDER: &str = "detail";

/// Paths with this many `/`-separated segments or fewer are left untouched.
const SHORT_PATH_SEGMENTS: usize = 4;

static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").expect("static regex is valid"));

/// Returns true if the segment looks like a variable identifier.
///
/// Version segments (`v1`, `v2`, ...) are never variable.
fn is_variable_segment(segment: &str) -> bool {
    DIGIT.is_match(segment) && !segment.starts_with('v')
}

/// Normalize a raw URL path into a stable handler identifier.
///
/// - Paths with at most four segments (the leading empty segment included)
///   are returned as is.
/// - A final segment that contains a digit and does not start with `v` is
///   replaced with [`DETAIL_PLACEHOLDER`].
/// - Digit-bearing segments before the final one are dropped.
/// - Trailing slashes are trimmed.
///
/// ```
/// use http_metrics::normalize_path;
///
/// assert_eq!(normalize_path("/api/v1/brands/123"), "/api/v1/brands/detail");
/// assert_eq!(normalize_path("/api/v1/orders/247643/claim"), "/api/v1/orders/claim");
/// assert_eq!(normalize_path("/test/01"), "/test/01");
/// ```
pub fn normalize_path(url_path: &str) -> String {
    let segments: Vec<&str> = url_path.split('/').collect();
    let count = segments.len();
    if count <= SHORT_PATH_SEGMENTS {
        return url_path.to_string();
    }

    let mut normalized = String::with_capacity(url_path.len());
    for (i, segment) in segments.iter().enumerate() {
        if is_variable_segment(segment) {
            if i == count - 1 {
                normalized.push_str(DETAIL_PLACEHOLDER);
            }
        } else {
            normalized.push_str(segment);
            normalized.push('/');
        }
    }

    normalized.trim_end_matches('/').to_string()
}
