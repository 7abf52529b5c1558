//! Backend forwarding code to a remote execution service.

use std::time::Duration;

use async_trait::async_trait;
use codecell_core::{BackendError, BackendFactory, ExecutionBackend, ExecutionOutcome};
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};

use crate::protocol::{
    EXECUTE_PATH, ExecuteRequest, ExecuteResponse, SHUTDOWN_PATH, ShutdownRequest,
    ShutdownResponse, endpoint,
};

/// Remote session handle keyed by conversation id.
///
/// The service aggregates kernel messages itself; this client only recovers
/// the outcome tag from the returned text.
#[derive(Debug, Clone)]
pub struct RemoteKernelClient {
    http: Client,
    base_url: String,
    conversation_id: String,
    shut_down: bool,
}

impl RemoteKernelClient {
    /// Create a client for `conversation_id` on the service at `base_url`.
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            conversation_id: conversation_id.into(),
            shut_down: false,
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = endpoint(&self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::Transport(format!("{url}: {status} - {text}")));
        }

        resp.json::<R>()
            .await
            .map_err(|e| BackendError::Transport(format!("{url}: invalid response body: {e}")))
    }
}

#[async_trait]
impl ExecutionBackend for RemoteKernelClient {
    async fn execute(&mut self, code: &str) -> Result<ExecutionOutcome, BackendError> {
        if self.shut_down {
            return Err(BackendError::ShutDown);
        }
        let request = ExecuteRequest {
            convid: self.conversation_id.clone(),
            code: code.to_string(),
        };
        let response: ExecuteResponse = self.post(EXECUTE_PATH, &request).await?;
        if response.new_kernel_created {
            tracing::info!(conversation_id = %self.conversation_id, "New kernel created for conversation");
        }
        Ok(ExecutionOutcome::from_remote_response(response.result))
    }

    async fn shutdown(&mut self) -> Result<(), BackendError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let request = ShutdownRequest {
            convid: self.conversation_id.clone(),
        };
        let response: ShutdownResponse = self.post(SHUTDOWN_PATH, &request).await?;
        tracing::info!(
            conversation_id = %self.conversation_id,
            released = response.shutdown,
            "Remote session shutdown"
        );
        Ok(())
    }
}

/// Hands out [`RemoteKernelClient`]s sharing one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct RemoteBackendFactory {
    http: Client,
    base_url: String,
}

impl RemoteBackendFactory {
    /// Create a factory for the service at `base_url`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| BackendError::Startup(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Base URL of the service.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl BackendFactory for RemoteBackendFactory {
    async fn create(
        &self,
        conversation_id: &str,
    ) -> Result<Box<dyn ExecutionBackend>, BackendError> {
        tracing::debug!(conversation_id, base_url = %self.base_url, "Using remote execution service");
        Ok(Box::new(RemoteKernelClient::new(
            self.http.clone(),
            self.base_url.clone(),
            conversation_id,
        )))
    }
}
