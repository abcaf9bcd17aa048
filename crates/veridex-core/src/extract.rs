//! Best-effort extraction of a JSON object from oracle free text.
//!
//! Oracle replies are only loosely guaranteed to contain JSON: the object
//! may be fenced, bare, or buried in prose. [`extract_json`] tries the three
//! shapes in order and returns `None` rather than erroring when all fail.
//! It carries no knowledge of the shape the caller expects — every caller
//! supplies its own fallback for the data it wanted.

use serde_json::Value;

/// Extracts the first JSON value found in `text`.
///
/// Tried in order: the first fenced code block (optionally tagged `json`),
/// the whole text, and the first brace-matched `{...}` span.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(block) = fenced_block(text) {
        if let Ok(v) = serde_json::from_str::<Value>(block.trim()) {
            return Some(v);
        }
    }

    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Some(v);
    }

    if let Some(span) = brace_span(text) {
        if let Ok(v) = serde_json::from_str::<Value>(span) {
            return Some(v);
        }
    }

    None
}

/// Returns the contents of the first ``` fenced block, tag line stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip an optional language tag up to the first newline.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Returns the first balanced `{...}` span, tracking strings and escapes.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
