//! Turning an aggregated tree into a printable report.
//!
//! - [`builder`]: depth-cut flattening into [`ReportRow`]s
//! - [`render`]: sorting, prefix filtering and table/JSON output

pub mod builder;
pub mod render;

use thiserror::Error;

pub use builder::{size_kb, ReportBuilder, ReportRow};
pub use render::{ReportRenderer, ReportSummary};

/// Marker appended to prefixes (internal nodes) in report keys.
pub const WILDCARD: char = '*';

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report depth must be at least 1, got {0}")]
    InvalidLevels(u32),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Strip one trailing wildcard from a user supplied prefix filter.
///
/// Callers pass the raw filter; [`derive_levels`] and
/// [`ReportRenderer::select`] normalize it themselves.
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.strip_suffix(WILDCARD).unwrap_or(prefix)
}

/// Pick the flatten depth.
///
/// An explicit level wins. Otherwise a prefix filter of `n` segments shows
/// the level right below it (`n + 1`), and without either the default is used.
pub fn derive_levels(
    level: Option<u32>,
    prefix: Option<&str>,
    default_levels: u32,
    delimiter: char,
) -> u32 {
    match (level, prefix) {
        (Some(level), _) => level,
        (None, Some(prefix)) => normalize_prefix(prefix).split(delimiter).count() as u32 + 1,
        (None, None) => default_levels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("a:b:*"), "a:b:");
        assert_eq!(normalize_prefix("a:b:"), "a:b:");
        assert_eq!(normalize_prefix("*"), "");
        assert_eq!(normalize_prefix("a:**"), "a:*");
    }

    #[test]
    fn test_derive_levels() {
        assert_eq!(derive_levels(None, None, 3, ':'), 3);
        assert_eq!(derive_levels(Some(5), Some("a:b:"), 3, ':'), 5);
        // "a:b:" splits into three segments, so the children of a:b show.
        assert_eq!(derive_levels(None, Some("a:b:"), 3, ':'), 4);
        assert_eq!(derive_levels(None, Some("a:b:*"), 3, ':'), 4);
        assert_eq!(derive_levels(None, Some("a"), 3, ':'), 2);
        assert_eq!(derive_levels(None, Some("a:**"), 3, ':'), 3);
    }
}
