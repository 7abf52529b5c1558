//! Core traits for execution backends.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{ExecutionOutcome, KernelMessage};

/// Backend error.
///
/// Execution errors reported by the interpreter are not represented here;
/// they travel as [`ExecutionOutcome::Error`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend failed to start: {0}")]
    Startup(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Kernel not ready after {0:?}")]
    ReadyTimeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Kernel message channel closed")]
    Disconnected,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Backend already shut down")]
    ShutDown,
}

impl BackendError {
    /// Whether this error happened while constructing the backend.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::Startup(_) | Self::ExecutableNotFound(_) | Self::ReadyTimeout(_)
        )
    }
}

/// A live execution environment bound to one conversation.
///
/// Submissions against one backend are strictly sequential; `&mut self`
/// enforces that a new submission cannot start while a prior stream is open.
#[async_trait]
pub trait ExecutionBackend: Send {
    /// Submit code and wait for its outcome.
    async fn execute(&mut self, code: &str) -> Result<ExecutionOutcome, BackendError>;

    /// Release the backend. Calling this more than once is a no-op.
    async fn shutdown(&mut self) -> Result<(), BackendError>;
}

/// Creates backends for conversations.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Create a ready-to-use backend for `conversation_id`.
    ///
    /// May block for the backend's readiness handshake.
    async fn create(
        &self,
        conversation_id: &str,
    ) -> Result<Box<dyn ExecutionBackend>, BackendError>;
}

/// Source of kernel messages with a per-read timeout.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when the wait timed out.
    async fn next_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<KernelMessage>, BackendError>;
}
