//! Caller-facing execution client.

use std::sync::Arc;

use codecell_core::ExecutionOutcome;

use crate::registry::{SessionError, SessionHandle, SessionRegistry};

/// Executes code for one conversation and returns agent-ready feedback.
#[derive(Clone)]
pub struct ExecutionClient {
    registry: Arc<SessionRegistry>,
    handle: SessionHandle,
}

impl ExecutionClient {
    /// Resolve (or create) the session for `conversation_id` in `registry`.
    ///
    /// # Errors
    /// Returns a construction error if the backend cannot be created.
    pub async fn connect(
        registry: Arc<SessionRegistry>,
        conversation_id: &str,
    ) -> Result<Self, SessionError> {
        let handle = registry.resolve_or_create(conversation_id).await?;
        Ok(Self { registry, handle })
    }

    /// Conversation this client executes for.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        self.handle.conversation_id()
    }

    /// Whether connecting created a new backend.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        self.handle.is_fresh()
    }

    /// Execute code and return the tagged outcome.
    ///
    /// # Errors
    /// Returns error on backend or transport failure.
    pub async fn execute_outcome(&self, code: &str) -> Result<ExecutionOutcome, SessionError> {
        tracing::debug!(conversation_id = self.conversation_id(), "Executing code");
        self.handle.execute(code).await
    }

    /// Execute code and return feedback text.
    ///
    /// Execution errors come back as a compact excerpt rather than an `Err`,
    /// so an agent loop can feed them into its next turn.
    ///
    /// # Errors
    /// Returns error on backend or transport failure.
    pub async fn execute(&self, code: &str) -> Result<String, SessionError> {
        Ok(self.execute_outcome(code).await?.into_feedback())
    }

    /// Release this conversation's backend.
    ///
    /// # Errors
    /// Returns error if the backend fails to shut down.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.registry.shutdown(self.conversation_id()).await?;
        Ok(())
    }
}
