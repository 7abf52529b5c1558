//! Rebuild one submission result from a multiplexed message stream.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use regex::Regex;
use serde_json::Value;

use crate::{
    ExecutionOutcome, ExecutionState, KernelMessage, MessageContent, MessageSource,
    message::{MIME_IMAGE_PNG, MIME_TEXT_PLAIN, MimeBundle},
    normalize::BLOCK_DELIMITER,
    traits::BackendError,
};

const ANSI_SGR: &str = r"\x1B\[\d+(;\d+){0,2}m";

/// Remove ANSI color sequences.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    match Regex::new(ANSI_SGR) {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(e) => {
            tracing::warn!("Invalid ANSI pattern: {e}");
            text.to_string()
        }
    }
}

/// Whether the aggregator needs more messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// Accumulates output fragments for one correlation token.
#[derive(Debug)]
pub struct OutputAggregator {
    token: String,
    fragments: Vec<String>,
    errored: bool,
    discarded: usize,
}

impl OutputAggregator {
    /// Create an aggregator for the submission identified by `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            fragments: Vec::new(),
            errored: false,
            discarded: 0,
        }
    }

    /// Feed one message.
    ///
    /// Messages for other tokens are discarded. An `error` ends the stream
    /// after its traceback is recorded; an idle `status` ends it cleanly.
    pub fn accept(&mut self, msg: KernelMessage) -> Step {
        if !msg.belongs_to(&self.token) {
            self.discarded += 1;
            tracing::debug!(kind = msg.kind(), parent = ?msg.parent_id, "Discarding stale message");
            return Step::Continue;
        }

        match msg.content {
            MessageContent::Error { traceback, .. } => {
                self.fragments
                    .push(strip_ansi(&traceback.join(BLOCK_DELIMITER)));
                self.errored = true;
                Step::Done
            }
            MessageContent::Stream { text, .. } => {
                self.fragments.push(text);
                Step::Continue
            }
            MessageContent::ExecuteResult { data } | MessageContent::DisplayData { data } => {
                self.push_rich(&data);
                Step::Continue
            }
            MessageContent::Status { execution_state } => {
                if execution_state == ExecutionState::Idle {
                    Step::Done
                } else {
                    Step::Continue
                }
            }
        }
    }

    fn push_rich(&mut self, data: &MimeBundle) {
        if let Some(Value::String(text)) = data.get(MIME_TEXT_PLAIN) {
            self.fragments.push(text.clone());
        }
        if let Some(Value::String(payload)) = data.get(MIME_IMAGE_PNG) {
            if let Some(reference) = image_reference(payload) {
                self.fragments.push(reference);
            }
        }
    }

    /// Number of messages dropped for belonging to another submission.
    #[must_use]
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    /// Outcome once the stream reached a terminal message.
    #[must_use]
    pub fn finish(self) -> ExecutionOutcome {
        let text = self.fragments.concat();
        if self.errored {
            ExecutionOutcome::Error(text)
        } else if self.fragments.is_empty() {
            ExecutionOutcome::NoOutput
        } else {
            ExecutionOutcome::Output(text)
        }
    }
}

/// Markdown image reference with the PNG inlined, if the payload is valid base64.
fn image_reference(payload: &str) -> Option<String> {
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    match BASE64.decode(compact.as_bytes()) {
        Ok(_) => Some(format!("![image](data:{MIME_IMAGE_PNG};base64,{compact})")),
        Err(e) => {
            tracing::warn!("Skipping undecodable image payload: {e}");
            None
        }
    }
}

/// Drain `source` for the submission identified by `token`.
///
/// Each read waits at most `read_timeout`; a read that times out ends the
/// submission with [`ExecutionOutcome::TimedOut`], discarding partial output.
///
/// # Errors
/// Returns error if the source fails or closes before a terminal message.
pub async fn aggregate<S>(
    source: &mut S,
    token: &str,
    read_timeout: Duration,
) -> Result<ExecutionOutcome, BackendError>
where
    S: MessageSource + ?Sized,
{
    let mut aggregator = OutputAggregator::new(token);
    loop {
        let Some(msg) = source.next_message(read_timeout).await? else {
            tracing::warn!(token, ?read_timeout, "Execution timed out");
            return Ok(ExecutionOutcome::TimedOut {
                after: read_timeout,
            });
        };
        if aggregator.accept(msg) == Step::Done {
            return Ok(aggregator.finish());
        }
    }
}
