//! HTTP transport for remote code-execution services.
//!
//! Provides:
//! - Wire protocol (JSON)
//! - `RemoteKernelClient` - Backend forwarding code to a remote service
//! - HTTP execution service over a session registry (feature: server)

pub mod client;
pub mod protocol;

#[cfg(feature = "server")]
pub mod server;

pub use client::{RemoteBackendFactory, RemoteKernelClient};
pub use protocol::{ExecuteRequest, ExecuteResponse, ShutdownRequest, ShutdownResponse};
