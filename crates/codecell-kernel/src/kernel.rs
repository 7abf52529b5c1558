//! Persistent interpreter process bound to one conversation.

use std::{
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use codecell_core::{
    BackendError, BackendFactory, ExecConfig, ExecutionBackend, ExecutionOutcome, ExecutionState,
    MessageContent, MessageSource, aggregate,
};
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader},
    process::Command,
};

use crate::{
    command::{CommandBuildError, InterpreterCommand},
    peer::{KernelMessages, KernelPeer},
};

/// How long a kernel may take to exit after a shutdown request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

impl From<CommandBuildError> for BackendError {
    fn from(err: CommandBuildError) -> Self {
        match err {
            CommandBuildError::NotFound(program) => Self::ExecutableNotFound(program),
            other => Self::Startup(other.to_string()),
        }
    }
}

/// A live interpreter process with persisted state.
///
/// The process group is killed on `shutdown` or, failing that, on drop.
pub struct LocalKernel {
    conversation_id: String,
    child: Option<AsyncGroupChild>,
    peer: KernelPeer,
    messages: KernelMessages,
    read_timeout: Duration,
    shut_down: bool,
}

impl LocalKernel {
    /// Start an interpreter and wait for its readiness handshake.
    ///
    /// # Errors
    /// Returns a construction error if the interpreter cannot be spawned or
    /// does not become ready within `config.ready_timeout()`.
    pub async fn start(conversation_id: &str, config: &ExecConfig) -> Result<Self, BackendError> {
        let (program, args) = InterpreterCommand::new(config.interpreter.as_str())
            .build()?
            .into_resolved()
            .await?;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .group_spawn()
            .map_err(|e| BackendError::Startup(format!("{}: {e}", program.display())))?;

        let stdin = child.inner().stdin.take();
        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.start_kill();
            return Err(BackendError::Startup("kernel stdio unavailable".into()));
        };
        if let Some(stderr) = stderr {
            forward_stderr(conversation_id.to_string(), stderr);
        }

        let mut kernel = Self::attach(conversation_id, stdin, stdout, config.read_timeout());
        kernel.child = Some(child);

        // a failed handshake drops the kernel, which kills the process group
        kernel.wait_for_ready(config.ready_timeout()).await?;

        tracing::info!(
            conversation_id,
            interpreter = %program.display(),
            "Local kernel started"
        );
        Ok(kernel)
    }

    /// Wrap an already-running kernel's stdio.
    #[must_use]
    pub fn attach<W, R>(conversation_id: &str, stdin: W, stdout: R, read_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (peer, messages) = KernelPeer::spawn(stdin, stdout);
        Self {
            conversation_id: conversation_id.to_string(),
            child: None,
            peer,
            messages,
            read_timeout,
            shut_down: false,
        }
    }

    /// Conversation this kernel belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Block until the kernel answers a `kernel_info_request`.
    ///
    /// # Errors
    /// Returns `ReadyTimeout` if no answer arrives within `timeout`, or
    /// `Startup` if the kernel exits first.
    pub async fn wait_for_ready(&mut self, timeout: Duration) -> Result<(), BackendError> {
        let deadline = Instant::now() + timeout;
        let token = self.peer.kernel_info().await?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BackendError::ReadyTimeout(timeout));
            }
            let msg = match self.messages.next_message(remaining).await {
                Ok(Some(msg)) => msg,
                Ok(None) => return Err(BackendError::ReadyTimeout(timeout)),
                Err(BackendError::Disconnected) => {
                    return Err(BackendError::Startup(
                        "kernel exited before becoming ready".into(),
                    ));
                }
                Err(e) => return Err(e),
            };
            if msg.belongs_to(&token)
                && matches!(
                    msg.content,
                    MessageContent::Status {
                        execution_state: ExecutionState::Idle
                    }
                )
            {
                return Ok(());
            }
        }
    }

    /// Submit code and drain its messages.
    ///
    /// # Errors
    /// Returns error if the kernel is gone or the channel fails.
    pub async fn run(&mut self, code: &str) -> Result<ExecutionOutcome, BackendError> {
        if self.shut_down {
            return Err(BackendError::ShutDown);
        }
        let token = self.peer.execute(code).await?;
        tracing::debug!(conversation_id = %self.conversation_id, %token, "Submitted code");
        aggregate(&mut self.messages, &token, self.read_timeout).await
    }
}

#[async_trait]
impl ExecutionBackend for LocalKernel {
    async fn execute(&mut self, code: &str) -> Result<ExecutionOutcome, BackendError> {
        self.run(code).await
    }

    async fn shutdown(&mut self) -> Result<(), BackendError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        if let Err(e) = self.peer.shutdown().await {
            tracing::debug!("Failed to send shutdown request: {e}");
        }

        if let Some(mut child) = self.child.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await.is_err() {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill kernel process group: {e}");
                }
                child.wait().await?;
            }
        }

        tracing::info!(conversation_id = %self.conversation_id, "Local kernel shutdown");
        Ok(())
    }
}

impl Drop for LocalKernel {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
            tracing::debug!(conversation_id = %self.conversation_id, "Local kernel dropped - process group killed");
        }
    }
}

fn forward_stderr<R>(conversation_id: String, stderr: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(%conversation_id, "kernel stderr: {line}");
        }
    });
}

/// Starts one [`LocalKernel`] per conversation.
#[derive(Debug, Clone, Default)]
pub struct LocalKernelFactory {
    config: ExecConfig,
}

impl LocalKernelFactory {
    /// Create a factory with the given configuration.
    #[must_use]
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BackendFactory for LocalKernelFactory {
    async fn create(
        &self,
        conversation_id: &str,
    ) -> Result<Box<dyn ExecutionBackend>, BackendError> {
        let kernel = LocalKernel::start(conversation_id, &self.config).await?;
        Ok(Box::new(kernel))
    }
}

#[cfg(test)]
mod tests {
    use codecell_core::KernelMessage;
    use serde_json::{Value, json};
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    use super::*;

    /// In-memory kernel understanding a handful of fixed snippets.
    ///
    /// `sleep` never finishes until the next request arrives, at which point
    /// its late output is flushed first.
    fn fake_kernel(stdin: DuplexStream, mut stdout: DuplexStream) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdin).lines();
            let mut sleeping: Option<String> = None;
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let id = request["msg_id"].as_str().unwrap_or_default().to_string();
                let mut out = Vec::new();
                if let Some(stale) = sleeping.take() {
                    out.push(KernelMessage::stdout(&stale, "late\n"));
                    out.push(KernelMessage::status(&stale, ExecutionState::Idle));
                }
                match request["msg_type"].as_str() {
                    Some("kernel_info_request") => {
                        out.push(KernelMessage::status(&id, ExecutionState::Busy));
                        out.push(KernelMessage::status(&id, ExecutionState::Idle));
                    }
                    Some("execute_request") => {
                        out.push(KernelMessage::status(&id, ExecutionState::Busy));
                        match request["code"].as_str().unwrap_or_default() {
                            "sleep" => {
                                sleeping = Some(id.clone());
                                out.clear();
                            }
                            "boom" => out.push(KernelMessage::new(
                                &id,
                                MessageContent::Error {
                                    ename: "NameError".into(),
                                    evalue: "boom".into(),
                                    traceback: vec![
                                        "\x1b[31m-----\x1b[0m\nNameError  Traceback".into(),
                                        "Cell In[1], line 1\n----> 1 boom".into(),
                                        "NameError: name 'boom' is not defined".into(),
                                    ],
                                },
                            )),
                            "pass" => {}
                            other => out.push(KernelMessage::stdout(&id, format!("{other}\n"))),
                        }
                        if sleeping.as_deref() != Some(id.as_str()) {
                            out.push(KernelMessage::status(&id, ExecutionState::Idle));
                        }
                    }
                    _ => break,
                }
                for msg in out {
                    let mut line = serde_json::to_string(&msg).unwrap();
                    line.push('\n');
                    stdout.write_all(line.as_bytes()).await.unwrap();
                }
            }
        });
    }

    async fn attached_kernel(read_timeout: Duration) -> LocalKernel {
        let (client_in, kernel_in) = duplex(64 * 1024);
        let (kernel_out, client_out) = duplex(64 * 1024);
        fake_kernel(kernel_in, kernel_out);
        let mut kernel = LocalKernel::attach("conv-1", client_in, client_out, read_timeout);
        kernel.wait_for_ready(Duration::from_secs(5)).await.unwrap();
        kernel
    }

    #[tokio::test]
    async fn test_output_and_no_output() {
        let mut kernel = attached_kernel(Duration::from_secs(5)).await;
        assert_eq!(
            kernel.execute("hello").await.unwrap(),
            ExecutionOutcome::Output("hello\n".into())
        );
        assert_eq!(kernel.execute("pass").await.unwrap(), ExecutionOutcome::NoOutput);
    }

    #[tokio::test]
    async fn test_error_is_outcome_not_failure() {
        let mut kernel = attached_kernel(Duration::from_secs(5)).await;
        let outcome = kernel.execute("boom").await.unwrap();
        let ExecutionOutcome::Error(raw) = outcome.clone() else {
            panic!("expected error outcome, got {outcome:?}");
        };
        assert!(!raw.contains('\x1b'));
        let feedback = outcome.into_feedback();
        assert!(feedback.contains("NameError"));
        assert!(feedback.contains("Cell In[1]"));

        // trailing idle of the failed submission must not leak into the next one
        assert_eq!(
            kernel.execute("after").await.unwrap(),
            ExecutionOutcome::Output("after\n".into())
        );
    }

    #[tokio::test]
    async fn test_timeout_leaves_kernel_usable() {
        let mut kernel = attached_kernel(Duration::from_millis(100)).await;
        let outcome = kernel.execute("sleep").await.unwrap();
        assert!(outcome.is_timeout());
        assert_eq!(
            outcome.into_feedback(),
            "[Execution timed out (0.1 seconds).]"
        );

        kernel.read_timeout = Duration::from_secs(5);
        assert_eq!(
            kernel.execute("again").await.unwrap(),
            ExecutionOutcome::Output("again\n".into())
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mut kernel = attached_kernel(Duration::from_secs(5)).await;
        kernel.shutdown().await.unwrap();
        kernel.shutdown().await.unwrap();
        assert!(matches!(
            kernel.execute("hello").await,
            Err(BackendError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_ready_timeout() {
        let (client_in, _kernel_in) = duplex(1024);
        let (_kernel_out, client_out) = duplex(1024);
        let mut kernel = LocalKernel::attach("silent", client_in, client_out, Duration::from_secs(1));
        let err = kernel
            .wait_for_ready(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ReadyTimeout(_)));
        assert!(err.is_construction());
    }

    #[tokio::test]
    async fn test_exit_before_ready() {
        let (client_in, _kernel_in) = duplex(1024);
        let (kernel_out, client_out) = duplex(1024);
        drop(kernel_out);
        let mut kernel = LocalKernel::attach("dead", client_in, client_out, Duration::from_secs(1));
        let err = kernel.wait_for_ready(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BackendError::Startup(_)));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_construction_error() {
        let config = ExecConfig {
            interpreter: "definitely-not-a-real-interpreter-xyz".into(),
            ..ExecConfig::default()
        };
        let err = LocalKernelFactory::new(config)
            .create("conv")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::ExecutableNotFound(_)));
        assert!(err.is_construction());
    }

    #[test]
    fn test_messages_roundtrip_through_json() {
        let msg = KernelMessage::stdout("t", "x");
        let line = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&line).unwrap(),
            json!({"parent_id": "t", "msg_type": "stream", "content": {"name": "stdout", "text": "x"}})
        );
    }
}
