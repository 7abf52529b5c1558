//! Kernel protocol: JSON requests on stdin, JSON messages on stdout.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use codecell_core::{BackendError, KernelMessage, MessageSource};
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use uuid::Uuid;

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PeerError> for BackendError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::Io(e) => Self::Io(e),
            PeerError::Json(e) => Self::Protocol(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
enum KernelRequest<'a> {
    ExecuteRequest { msg_id: &'a str, code: &'a str },
    KernelInfoRequest { msg_id: &'a str },
    ShutdownRequest,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half of the kernel protocol.
#[derive(Clone)]
pub struct KernelPeer {
    stdin: Arc<Mutex<BoxedWriter>>,
}

impl KernelPeer {
    /// Spawn a new protocol peer.
    ///
    /// This starts a background task decoding stdout lines into messages.
    #[must_use]
    pub fn spawn<W, R>(stdin: W, stdout: R) -> (Self, KernelMessages)
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let peer = Self {
            stdin: Arc::new(Mutex::new(Box::new(stdin))),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            if let Err(e) = read_loop(stdout, tx).await {
                tracing::error!("Kernel reader loop error: {}", e);
            }
        });

        (peer, KernelMessages { rx, reader })
    }

    /// Submit code; returns the correlation token of the request.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn execute(&self, code: &str) -> Result<String, PeerError> {
        let msg_id = new_msg_id();
        self.send_json(&KernelRequest::ExecuteRequest {
            msg_id: &msg_id,
            code,
        })
        .await?;
        Ok(msg_id)
    }

    /// Ask the kernel to report in; returns the correlation token.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn kernel_info(&self) -> Result<String, PeerError> {
        let msg_id = new_msg_id();
        self.send_json(&KernelRequest::KernelInfoRequest { msg_id: &msg_id })
            .await?;
        Ok(msg_id)
    }

    /// Ask the kernel to exit.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn shutdown(&self) -> Result<(), PeerError> {
        self.send_json(&KernelRequest::ShutdownRequest).await
    }

    async fn send_json<T: Serialize>(&self, message: &T) -> Result<(), PeerError> {
        let json = serde_json::to_string(message)?;
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

fn new_msg_id() -> String {
    Uuid::new_v4().to_string()
}

async fn read_loop<R>(
    stdout: R,
    tx: mpsc::UnboundedSender<KernelMessage>,
) -> Result<(), std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if reader.read_line(&mut buffer).await? == 0 {
            break; // EOF
        }
        let line = buffer.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<KernelMessage>(line) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(line, "Skipping malformed kernel line: {e}"),
        }
    }
    Ok(())
}

/// Read half of the kernel protocol.
///
/// Closes when the kernel's stdout reaches EOF.
pub struct KernelMessages {
    rx: mpsc::UnboundedReceiver<KernelMessage>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl MessageSource for KernelMessages {
    async fn next_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<KernelMessage>, BackendError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(BackendError::Disconnected),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for KernelMessages {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
