//! Utility functions and helpers.

pub mod http;

use unicode_segmentation::UnicodeSegmentation;

/// Ellipsis appended to truncated text.
pub const ELLIPSIS: &str = "…";

/// Limit text to `max` grapheme clusters, ending with an ellipsis when cut.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    if text.graphemes(true).count() <= max {
        return text.to_string();
    }
    let mut out: String = text.graphemes(true).take(max.saturating_sub(1)).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
