//! Compact error feedback from raw interpreter tracebacks.
//!
//! Both backends emit tracebacks as blocks joined by [`BLOCK_DELIMITER`], with
//! a frame rule made of dashes. The excerpt keeps at most three blocks: the
//! first one naming an `Error`, the first one starting with `Cell`, and the
//! last one. Blocks may repeat; this is a heuristic, not a traceback parser.

/// Marker whose presence flags a response as a traceback.
pub const TRACEBACK_MARKER: &str = "-----";

/// Separator between traceback blocks.
pub const BLOCK_DELIMITER: &str = "\n\n\n\n";

const ERROR_NEEDLE: &str = "Error";
const CELL_PREFIX: &str = "Cell";

/// Whether a raw backend response carries a traceback.
#[must_use]
pub fn is_error_response(raw: &str) -> bool {
    raw.contains(TRACEBACK_MARKER)
}

/// Reduce a raw traceback to a short excerpt for an agent.
#[must_use]
pub fn normalize_error(raw: &str) -> String {
    let blocks: Vec<&str> = raw.split(BLOCK_DELIMITER).collect();
    let mut feedback = String::new();

    if let Some(block) = blocks.iter().find(|b| b.contains(ERROR_NEEDLE)) {
        feedback.push_str(block);
        feedback.push('\n');
    }

    if let Some(block) = blocks.iter().find(|b| b.starts_with(CELL_PREFIX)) {
        feedback.push_str(block);
    }

    // split always yields at least one block
    if let Some(last) = blocks.last() {
        feedback.push_str(last);
    }

    feedback
}
