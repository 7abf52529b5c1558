//! Session registry mapping conversation ids to backends.

use std::{collections::HashMap, sync::Arc};

use codecell_core::{BackendError, BackendFactory, ExecutionBackend, ExecutionOutcome};
use tokio::sync::{Mutex, OnceCell, RwLock};

/// Session registry error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Session {0} was shut down while it was being created")]
    ShutDownDuringCreation(String),
}

impl SessionError {
    /// Whether the backend could not be constructed.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_construction(),
            Self::ShutDownDuringCreation(_) => false,
        }
    }
}

/// A backend exclusively owned by one conversation.
struct Session {
    conversation_id: String,
    backend: Mutex<Box<dyn ExecutionBackend>>,
}

type SessionSlot = Arc<OnceCell<Arc<Session>>>;

/// Handle to a resolved session.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Session>,
    fresh: bool,
}

impl SessionHandle {
    /// Conversation this session belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.session.conversation_id
    }

    /// Whether the backend was created by the resolve call that returned this handle.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Whether two handles refer to the same backend.
    #[must_use]
    pub fn same_backend(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }

    /// Submit code to the session's backend.
    ///
    /// # Errors
    /// Returns error if the backend is gone or its channel fails.
    pub async fn execute(&self, code: &str) -> Result<ExecutionOutcome, SessionError> {
        let mut backend = self.session.backend.lock().await;
        Ok(backend.execute(code).await?)
    }
}

/// Maps conversation ids to exactly one lazily created backend each.
///
/// Creation is serialized per id: concurrent resolves of the same new id
/// create a single backend, while different ids never wait on each other's
/// construction.
pub struct SessionRegistry {
    factory: Arc<dyn BackendFactory>,
    sessions: RwLock<HashMap<String, SessionSlot>>,
}

impl SessionRegistry {
    /// Create a registry creating backends with `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for `conversation_id`, creating its backend on first use.
    ///
    /// # Errors
    /// Returns a construction error if the backend cannot be created; the id
    /// is then left unregistered. Returns `ShutDownDuringCreation` if the id
    /// was shut down before creation finished; the new backend is released.
    pub async fn resolve_or_create(
        &self,
        conversation_id: &str,
    ) -> Result<SessionHandle, SessionError> {
        let slot = self.slot(conversation_id).await;

        let mut fresh = false;
        let result = slot
            .get_or_try_init(|| {
                fresh = true;
                self.create_session(conversation_id)
            })
            .await
            .cloned();

        match result {
            Ok(session) => {
                if !self.is_registered(conversation_id, &slot).await {
                    return Err(abandon(session, fresh).await);
                }
                Ok(SessionHandle { session, fresh })
            }
            Err(e) => {
                let mut sessions = self.sessions.write().await;
                if sessions
                    .get(conversation_id)
                    .is_some_and(|s| Arc::ptr_eq(s, &slot) && !s.initialized())
                {
                    sessions.remove(conversation_id);
                }
                Err(e.into())
            }
        }
    }

    async fn slot(&self, conversation_id: &str) -> SessionSlot {
        if let Some(slot) = self.sessions.read().await.get(conversation_id) {
            return Arc::clone(slot);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(conversation_id.to_string()).or_default())
    }

    async fn is_registered(&self, conversation_id: &str, slot: &SessionSlot) -> bool {
        self.sessions
            .read()
            .await
            .get(conversation_id)
            .is_some_and(|s| Arc::ptr_eq(s, slot))
    }

    async fn create_session(&self, conversation_id: &str) -> Result<Arc<Session>, BackendError> {
        tracing::info!(conversation_id, "Creating execution backend");
        let backend = self
            .factory
            .create(conversation_id)
            .await
            .inspect_err(|e| tracing::warn!(conversation_id, "Backend creation failed: {e}"))?;
        Ok(Arc::new(Session {
            conversation_id: conversation_id.to_string(),
            backend: Mutex::new(backend),
        }))
    }

    /// Release the backend for `conversation_id` and forget the session.
    ///
    /// Returns `false` if no live session was registered. A later resolve
    /// creates a brand-new backend.
    ///
    /// # Errors
    /// Returns error if the backend fails to shut down; the entry is removed regardless.
    pub async fn shutdown(&self, conversation_id: &str) -> Result<bool, SessionError> {
        let slot = self.sessions.write().await.remove(conversation_id);
        match slot.and_then(|s| s.get().cloned()) {
            Some(session) => {
                release(&session).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Release every outstanding backend; returns how many were released.
    ///
    /// Failures are logged and do not stop the sweep. Safe to call repeatedly.
    pub async fn shutdown_all(&self) -> usize {
        let drained: Vec<SessionSlot> = self.sessions.write().await.drain().map(|(_, s)| s).collect();

        let mut released = 0;
        for session in drained.iter().filter_map(|s| s.get()) {
            match release(session).await {
                Ok(()) => released += 1,
                Err(e) => tracing::warn!(
                    conversation_id = %session.conversation_id,
                    "Failed to shut down backend: {e}"
                ),
            }
        }
        tracing::info!(released, "All execution backends shut down");
        released
    }

    /// Whether a live session is registered for `conversation_id`.
    pub async fn contains(&self, conversation_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(conversation_id)
            .is_some_and(|s| s.initialized())
    }
}

/// The slot was removed by a shutdown while the backend was starting.
///
/// Only the creator releases the backend; nothing else can reach it.
async fn abandon(session: Arc<Session>, fresh: bool) -> SessionError {
    let conversation_id = session.conversation_id.clone();
    if fresh {
        tracing::info!(%conversation_id, "Releasing backend created during shutdown");
        if let Err(e) = release(&session).await {
            tracing::warn!(%conversation_id, "Failed to shut down backend: {e}");
        }
    }
    SessionError::ShutDownDuringCreation(conversation_id)
}

async fn release(session: &Session) -> Result<(), BackendError> {
    session.backend.lock().await.shutdown().await
}
