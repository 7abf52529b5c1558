//! Tagged result of one code submission.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::normalize::{is_error_response, normalize_error};

/// Placeholder returned when a submission completed without output.
pub const NO_OUTPUT: &str = "[Code executed successfully with no output]";

const TIMEOUT_PREFIX: &str = "[Execution timed out (";
const TIMEOUT_SUFFIX: &str = " seconds).]";

/// Outcome of a single submission.
///
/// Exactly one variant is produced per submission. Execution errors and
/// timeouts are outcomes, not Rust errors: the round trip itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Accumulated output fragments, concatenated in arrival order.
    Output(String),
    /// The submission completed without producing any fragment.
    NoOutput,
    /// A read exceeded the per-read timeout before completion.
    ///
    /// The backend may still be running the code; output it emits later is
    /// discarded by correlation token on the next submission.
    TimedOut { after: Duration },
    /// The backend reported an error; holds the raw accumulated text.
    Error(String),
}

impl ExecutionOutcome {
    /// Text for the "timed out" indication.
    ///
    /// Whole seconds render without a fraction; sub-second parts are kept.
    #[must_use]
    pub fn timeout_message(after: Duration) -> String {
        format!("{TIMEOUT_PREFIX}{}{TIMEOUT_SUFFIX}", after.as_secs_f64())
    }

    /// Whether this outcome carries an execution error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Whether this outcome is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Render for an agent: errors are reduced to a compact excerpt.
    #[must_use]
    pub fn into_feedback(self) -> String {
        match self {
            Self::Error(raw) => normalize_error(&raw),
            other => other.into_raw_text(),
        }
    }

    /// Render without normalizing errors.
    ///
    /// This is what an execution service sends over the wire; the receiving
    /// side recovers the tag with [`ExecutionOutcome::from_remote_response`].
    #[must_use]
    pub fn into_raw_text(self) -> String {
        match self {
            Self::Output(text) | Self::Error(text) => text,
            Self::NoOutput => NO_OUTPUT.to_string(),
            Self::TimedOut { after } => Self::timeout_message(after),
        }
    }

    /// Recover a tagged outcome from a single aggregated response string.
    #[must_use]
    pub fn from_remote_response(text: String) -> Self {
        if is_error_response(&text) {
            return Self::Error(text);
        }
        if text == NO_OUTPUT {
            return Self::NoOutput;
        }
        if let Some(after) = text
            .strip_prefix(TIMEOUT_PREFIX)
            .and_then(|rest| rest.strip_suffix(TIMEOUT_SUFFIX))
            .and_then(|secs| secs.parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        {
            return Self::TimedOut { after };
        }
        Self::Output(text)
    }
}
