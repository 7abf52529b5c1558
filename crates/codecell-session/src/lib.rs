//! Session orchestration for execution backends.
//!
//! Provides:
//! - `SessionRegistry` - One lazily created backend per conversation id
//! - `ExecutionClient` - Caller-facing handle turning outcomes into feedback

pub mod client;
pub mod registry;

pub use client::ExecutionClient;
pub use registry::{SessionError, SessionHandle, SessionRegistry};
