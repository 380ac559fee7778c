//! Character-safe truncation used for prompt excerpts, citation snippets and
//! document length caps. Lengths are counted in `char`s, never bytes.


pub const ELLIPSIS: &str = "...";

/// Returns the longest prefix of `text` holding at most `max_chars` characters
/// and whether anything was cut off.
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (text.get(..byte_index).unwrap_or(text), true),
        None => (text, false),
    }
}

/// Truncates to `max_chars` characters, appending [`ELLIPSIS`] only if text was dropped.
#[inline]
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let (prefix, truncated) = truncate_chars(text, max_chars);
    if truncated {
        format!("{}{}", prefix, ELLIPSIS)
    } else {
        prefix.to_string()
    }
}
