//! Report output.
//!
//! Rows are ordered by leaf count (largest first, ties keep traversal order),
//! optionally filtered by key prefix, and written either as a fixed-width
//! table or as JSON. Truncation of long keys only affects the table text.
//! The table ends with a footer summing the rows shown.

use std::borrow::Cow;
use std::fmt::Write as _;

use super::{normalize_prefix, ReportError, ReportRow};
use super::builder::round_kb;

const KEY_COLUMN: usize = 90;
const COUNT_COLUMN: usize = 10;
const SIZE_COLUMN: usize = 15;
const ELLIPSIS: &str = "...";

/// Totals over the rows a filter selects.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportSummary {
    pub rows: usize,
    pub leaf_count: u64,
    pub size_kb: f64,
}

/// Renders report rows for the console.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    /// Keys longer than this many characters are truncated.
    key_width: usize,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self { key_width: 80 }
    }
}

impl ReportRenderer {
    pub fn new(key_width: usize) -> Self {
        Self { key_width }
    }

    /// Sorted, filtered view over `rows`. The rows themselves are untouched.
    pub fn select<'a>(&self, rows: &'a [ReportRow], prefix: Option<&str>) -> Vec<&'a ReportRow> {
        let prefix = prefix.map(normalize_prefix);

        let mut selected: Vec<&ReportRow> = rows
            .iter()
            .filter(|row| prefix.map_or(true, |p| row.key.starts_with(p)))
            .collect();
        // Stable sort: equal counts stay in traversal order.
        selected.sort_by(|a, b| b.leaf_count.cmp(&a.leaf_count));
        selected
    }

    /// Row count, key count and size of the rows `select` keeps.
    ///
    /// Rows of one depth cut never overlap, so their totals add up.
    pub fn summarize(&self, rows: &[ReportRow], prefix: Option<&str>) -> ReportSummary {
        let selected = self.select(rows, prefix);
        ReportSummary {
            rows: selected.len(),
            leaf_count: selected.iter().map(|row| row.leaf_count).sum(),
            size_kb: round_kb(selected.iter().map(|row| row.size_kb).sum()),
        }
    }

    /// Key as shown in the table.
    pub fn display_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match key.char_indices().nth(self.key_width) {
            Some((cut, _)) => Cow::Owned(format!("{}{}", &key[..cut], ELLIPSIS)),
            None => Cow::Borrowed(key),
        }
    }

    fn key_column(&self) -> usize {
        KEY_COLUMN.max(self.key_width + ELLIPSIS.len() + 1)
    }

    /// Fixed-width table: header, separator rule, one line per row, then a
    /// rule and the summary footer.
    pub fn render(&self, rows: &[ReportRow], prefix: Option<&str>) -> String {
        let key_col = self.key_column();
        let rule = "-".repeat(key_col + COUNT_COLUMN + SIZE_COLUMN + 2);
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{:<key_col$} {:<COUNT_COLUMN$} {:<SIZE_COLUMN$}",
            "Key", "Nr. keys", "Size (KB)"
        );
        let _ = writeln!(out, "{rule}");

        let selected = self.select(rows, prefix);
        for row in &selected {
            let line = format!(
                "{:<key_col$} {:<COUNT_COLUMN$} {:<SIZE_COLUMN$}",
                self.display_key(&row.key),
                row.leaf_count,
                format!("{:.2}", row.size_kb),
            );
            let _ = writeln!(out, "{}", line.trim_end());
        }

        let summary = self.summarize(rows, prefix);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "Total: {} rows, {} keys, {:.2} KB",
            summary.rows, summary.leaf_count, summary.size_kb
        );

        out
    }

    /// JSON array of the selected rows, with full keys.
    pub fn render_json(&self, rows: &[ReportRow], prefix: Option<&str>) -> Result<String, ReportError> {
        let selected = self.select(rows, prefix);
        Ok(serde_json::to_string_pretty(&selected)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, leaf_count: u64, size_kb: f64) -> ReportRow {
        ReportRow {
            key: key.to_string(),
            leaf_count,
            size_kb,
        }
    }

    #[test]
    fn test_truncation() {
        let renderer = ReportRenderer::default();
        let long = "k".repeat(95);
        let shown = renderer.display_key(&long);
        assert_eq!(shown.len(), 83);
        assert!(shown.ends_with("..."));
        assert_eq!(&shown[..80], &long[..80]);

        let exact = "k".repeat(80);
        assert_eq!(renderer.display_key(&exact), exact.as_str());
    }

    #[test]
    fn test_truncation_counts_characters() {
        let renderer = ReportRenderer::new(3);
        assert_eq!(renderer.display_key("ééé"), "ééé");
        assert_eq!(renderer.display_key("éééé"), "ééé...");
    }

    #[test]
    fn test_stable_sort() {
        let rows = vec![
            row("first", 1, 0.0),
            row("big", 5, 0.0),
            row("second", 1, 0.0),
            row("third", 1, 0.0),
        ];
        let keys: Vec<&str> = ReportRenderer::default()
            .select(&rows, None)
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["big", "first", "second", "third"]);
    }

    #[test]
    fn test_table_layout() {
        let rows = vec![row("a:b:*", 2, 0.03)];
        let text = ReportRenderer::default().render(&rows, None);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Key "));
        assert!(lines[0].contains("Nr. keys"));
        assert!(lines[1].chars().all(|c| c == '-'));
        assert_eq!(lines[1].len(), 90 + 10 + 15 + 2);
        assert!(lines[2].starts_with("a:b:*"));
        assert_eq!(&lines[2][91..93], "2 ");
        assert!(lines[2].ends_with("0.03"));
        assert_eq!(lines[3], lines[1]);
        assert_eq!(lines[4], "Total: 1 rows, 2 keys, 0.03 KB");
    }

    #[test]
    fn test_footer_sums_shown_rows_only() {
        let rows = vec![
            row("a:*", 3, 0.13),
            row("b:*", 2, 1.5),
            row("c", 1, 0.01),
        ];
        let renderer = ReportRenderer::default();

        let summary = renderer.summarize(&rows, Some("a:*"));
        assert_eq!(
            summary,
            ReportSummary {
                rows: 1,
                leaf_count: 3,
                size_kb: 0.13,
            }
        );

        let all = renderer.summarize(&rows, None);
        assert_eq!(all.rows, 3);
        assert_eq!(all.leaf_count, 6);
        assert_eq!(all.size_kb, 1.64);

        let text = renderer.render(&rows, Some("b:"));
        assert_eq!(text.lines().last(), Some("Total: 1 rows, 2 keys, 1.50 KB"));
    }

    #[test]
    fn test_filter_strips_one_wildcard_only() {
        let rows = vec![row("a:*", 2, 0.0), row("a:x", 1, 0.0)];
        let keys: Vec<&str> = ReportRenderer::default()
            .select(&rows, Some("a:**"))
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["a:*"]);
    }

    #[test]
    fn test_render_does_not_mutate_rows() {
        let rows = vec![row(&"x".repeat(120), 1, 1.0)];
        let before = rows.clone();
        let _ = ReportRenderer::default().render(&rows, None);
        assert_eq!(rows, before);
    }
}
