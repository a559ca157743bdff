//! Elision markers and plan materialization

use once_cell::sync::Lazy;
use regex_lite::{NoExpand, Regex};

/// Sentinel a collaborator writes in place of unchanged text.
pub const ELISION_MARKER: &str = "////...existing code...////";

static MARKER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)////\.\.\.\s*existing\s+code\s*\.\.\.\s*////")
        .unwrap_or_else(|e| panic!("invalid elision marker pattern: {e}"))
});

/// Number of elision markers in `plan`.
pub fn count_markers(plan: &str) -> usize {
    MARKER_PATTERN.find_iter(plan).count()
}

/// Expand every elision marker in `plan` into the complete `original` text.
///
/// Each marker receives the whole original, not the span it stood for, so a
/// plan with two markers yields two copies of the original. A plan without
/// markers is returned as is.
pub fn materialize(plan: &str, original: &str) -> String {
    MARKER_PATTERN
        .replace_all(plan, NoExpand(original))
        .into_owned()
}
