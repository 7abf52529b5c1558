//! Process-wide backend selection.

use std::{collections::HashMap, sync::Arc};

use codecell_core::{BackendError, BackendFactory, BackendKind, ExecConfig};
use codecell_kernel::LocalKernelFactory;
use codecell_session::{ExecutionClient, SessionError, SessionRegistry};
use codecell_transport::RemoteBackendFactory;
use tokio::sync::RwLock;

/// Registry key for local kernels; remote registries are keyed by base URL.
const LOCAL_KEY: &str = "";

/// Execution service error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl ServiceError {
    /// Whether the backend for the conversation could not be constructed.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        match self {
            Self::Session(e) => e.is_construction(),
            Self::Backend(e) => e.is_construction(),
        }
    }
}

/// Hands out execution clients for conversations.
///
/// The backend kind is fixed at construction. In local mode every
/// conversation shares one registry and the URL argument is ignored; in
/// remote mode there is one registry per service base URL.
pub struct ExecutionService {
    config: ExecConfig,
    registries: RwLock<HashMap<String, Arc<SessionRegistry>>>,
}

impl ExecutionService {
    #[must_use]
    pub fn new(config: ExecConfig) -> Self {
        tracing::info!(backend = ?config.backend, "Execution service configured");
        Self {
            config,
            registries: RwLock::new(HashMap::new()),
        }
    }

    /// Selected backend kind.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.config.backend
    }

    /// Return the client for `conversation_id`, creating its session on first use.
    ///
    /// # Errors
    /// Returns a construction error if the session's backend cannot be created.
    pub async fn get_execution_client(
        &self,
        url: &str,
        conversation_id: &str,
    ) -> Result<ExecutionClient, ServiceError> {
        let registry = self.registry_for(url).await?;
        let client = ExecutionClient::connect(registry, conversation_id).await?;
        if client.is_fresh() {
            tracing::info!(conversation_id, "New kernel created for conversation");
        }
        Ok(client)
    }

    async fn registry_for(&self, url: &str) -> Result<Arc<SessionRegistry>, ServiceError> {
        let key = match self.config.backend {
            BackendKind::Local => LOCAL_KEY,
            BackendKind::Remote => url,
        };
        if let Some(registry) = self.registries.read().await.get(key) {
            return Ok(Arc::clone(registry));
        }

        let mut registries = self.registries.write().await;
        if let Some(registry) = registries.get(key) {
            return Ok(Arc::clone(registry));
        }
        let factory: Arc<dyn BackendFactory> = match self.config.backend {
            BackendKind::Local => Arc::new(LocalKernelFactory::new(self.config.clone())),
            BackendKind::Remote => Arc::new(RemoteBackendFactory::new(
                url,
                self.config.request_timeout(),
            )?),
        };
        let registry = Arc::new(SessionRegistry::new(factory));
        registries.insert(key.to_string(), Arc::clone(&registry));
        Ok(registry)
    }

    /// Release every session in every registry; returns how many were released.
    pub async fn shutdown_all(&self) -> usize {
        let registries: Vec<_> = self.registries.read().await.values().cloned().collect();
        let mut released = 0;
        for registry in registries {
            released += registry.shutdown_all().await;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use codecell_core::{ExecutionBackend, ExecutionOutcome};

    use super::*;

    fn local_config(interpreter: &str) -> ExecConfig {
        ExecConfig {
            backend: BackendKind::Local,
            interpreter: interpreter.to_string(),
            ..ExecConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_construction_error() {
        let service = ExecutionService::new(local_config("no-such-interpreter-4f1c"));
        let err = service
            .get_execution_client("", "conv")
            .await
            .err()
            .unwrap();
        assert!(err.is_construction());
        assert_eq!(service.shutdown_all().await, 0);
    }

    #[tokio::test]
    async fn test_local_mode_ignores_url() {
        let service = ExecutionService::new(local_config("no-such-interpreter-4f1c"));
        let _ = service.get_execution_client("http://a", "c").await;
        let _ = service.get_execution_client("http://b", "c").await;
        assert_eq!(service.registries.read().await.len(), 1);
    }

    struct Squares;

    #[async_trait]
    impl ExecutionBackend for Squares {
        async fn execute(&mut self, code: &str) -> Result<ExecutionOutcome, BackendError> {
            Ok(match code.trim().parse::<i64>() {
                Ok(n) => ExecutionOutcome::Output(format!("{}\n", n * n)),
                Err(_) => ExecutionOutcome::Error(format!(
                    "-----\nValueError\n\n\n\nCell In[1], line 1\n\n\n\nValueError: {code}\n"
                )),
            })
        }

        async fn shutdown(&mut self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    struct SquaresFactory;

    #[async_trait]
    impl BackendFactory for SquaresFactory {
        async fn create(&self, _: &str) -> Result<Box<dyn ExecutionBackend>, BackendError> {
            Ok(Box::new(Squares))
        }
    }

    #[tokio::test]
    async fn test_remote_mode_against_service() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(SquaresFactory)));
        let app = codecell_transport::server::create_router(Arc::clone(&registry));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let service = ExecutionService::new(ExecConfig {
            request_timeout_secs: Some(5),
            ..ExecConfig::default()
        });
        assert_eq!(service.backend(), BackendKind::Remote);

        let client = service.get_execution_client(&url, "conv").await.unwrap();
        assert_eq!(client.execute("7").await.unwrap(), "49\n");
        let feedback = client.execute("x").await.unwrap();
        assert_eq!(feedback, "-----\nValueError\nCell In[1], line 1ValueError: x\n");
        assert!(registry.contains("conv").await);

        assert_eq!(service.shutdown_all().await, 1);
        assert!(!registry.contains("conv").await);
        server.abort();
    }
}
