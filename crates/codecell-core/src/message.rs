//! Typed messages emitted by an execution backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MIME type carrying the plain-text representation of a value.
pub const MIME_TEXT_PLAIN: &str = "text/plain";
/// MIME type carrying a base64-encoded PNG.
pub const MIME_IMAGE_PNG: &str = "image/png";

/// Rich output keyed by MIME type.
pub type MimeBundle = BTreeMap<String, Value>;

/// Kernel execution state carried by `status` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Kernel process is starting up.
    Starting,
    /// Kernel is working on a request.
    Busy,
    /// Kernel finished the request it was working on.
    Idle,
}

/// Which stream a `stream` message was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// Kind-specific payload of a kernel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "content", rename_all = "snake_case")]
pub enum MessageContent {
    /// Text written to stdout/stderr.
    Stream { name: StreamName, text: String },
    /// Value of the trailing expression of a submission.
    ExecuteResult { data: MimeBundle },
    /// Explicitly displayed rich output.
    DisplayData { data: MimeBundle },
    /// Exception raised by the submission.
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    /// Kernel state transition.
    Status { execution_state: ExecutionState },
}

/// One unit of a backend's output stream.
///
/// `parent_id` is the correlation token of the request that produced the
/// message; unsolicited messages carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMessage {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub content: MessageContent,
}

impl KernelMessage {
    /// Create a message tagged with the given correlation token.
    #[must_use]
    pub fn new(parent_id: impl Into<String>, content: MessageContent) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            content,
        }
    }

    /// Whether this message belongs to the submission identified by `token`.
    #[must_use]
    pub fn belongs_to(&self, token: &str) -> bool {
        self.parent_id.as_deref() == Some(token)
    }

    /// Shorthand for a `stream` message on stdout.
    #[must_use]
    pub fn stdout(parent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            parent_id,
            MessageContent::Stream {
                name: StreamName::Stdout,
                text: text.into(),
            },
        )
    }

    /// Shorthand for a `status` message.
    #[must_use]
    pub fn status(parent_id: impl Into<String>, execution_state: ExecutionState) -> Self {
        Self::new(parent_id, MessageContent::Status { execution_state })
    }

    /// Wire name of the message kind, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self.content {
            MessageContent::Stream { .. } => "stream",
            MessageContent::ExecuteResult { .. } => "execute_result",
            MessageContent::DisplayData { .. } => "display_data",
            MessageContent::Error { .. } => "error",
            MessageContent::Status { .. } => "status",
        }
    }
}
