//! Pull executable code out of free-form agent text.

const OPENING_FENCE: &str = "```python";
const CLOSING_FENCE: &str = "```";

/// Return the body of the first ```` ```python ```` block, or `text` unchanged.
///
/// Leading and trailing newlines of the body are trimmed. An unterminated
/// block runs to the end of the text. The body is not validated.
#[must_use]
pub fn extract_code(text: &str) -> &str {
    let Some(start) = text.find(OPENING_FENCE) else {
        return text;
    };
    let body = &text[start + OPENING_FENCE.len()..];
    let body = body.find(CLOSING_FENCE).map_or(body, |end| &body[..end]);
    body.trim_matches('\n')
}
