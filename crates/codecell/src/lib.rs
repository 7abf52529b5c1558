//! Stateful code-execution sessions for agent loops.
//!
//! Each conversation gets one persistent interpreter session, either a local
//! kernel process or a session on a remote execution service, selected once
//! per process from [`ExecConfig`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), codecell::ServiceError> {
//! use codecell::{ExecConfig, ExecutionService, extract_code};
//!
//! let service = ExecutionService::new(ExecConfig::from_env());
//! let client = service
//!     .get_execution_client("http://localhost:8000", "conv-1")
//!     .await?;
//! let reply = "Let me check.\n```python\nprint(6 * 7)\n```";
//! let feedback = client.execute(extract_code(reply)).await?;
//! # drop(feedback);
//! service.shutdown_all().await;
//! # Ok(())
//! # }
//! ```

pub mod service;

pub use codecell_core::{
    BackendError, BackendKind, ExecConfig, ExecutionOutcome, extract_code, normalize_error,
};
pub use codecell_session::{ExecutionClient, SessionError};
pub use service::{ExecutionService, ServiceError};
