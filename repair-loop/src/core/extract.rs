//! Extraction of replacement code from a free-text oracle response.

use regex::Regex;

/// Pull a candidate replacement artifact out of `response`.
///
/// In order: the inner text of the first code fence tagged `fence_tag`; the
/// trimmed response when it already starts with `prologue`; otherwise `None`.
/// Nothing is guessed.
pub fn extract_fix(response: &str, fence_tag: &str, prologue: &str) -> Option<String> {
    let pattern = format!(r"(?s)```{}\s*(.*?)\s*```", regex::escape(fence_tag));
    if let Some(caps) = Regex::new(&pattern).ok()?.captures(response) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let trimmed = response.trim();
    if !prologue.is_empty() && trimmed.starts_with(prologue) {
        return Some(trimmed.to_string());
    }
    None
}
