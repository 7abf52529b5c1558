//! Core abstractions for stateful code-execution sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `KernelMessage` - Typed message from an execution backend
//! - `OutputAggregator` - Rebuilds one result from a message stream
//! - `normalize_error` - Compact excerpt of a raw traceback
//! - `extract_code` - Pulls a fenced code block out of agent text
//! - `ExecConfig` - Backend selection and timeouts
//! - Backend and factory traits

pub mod aggregator;
pub mod config;
pub mod extract;
pub mod message;
pub mod normalize;
pub mod outcome;
pub mod traits;

pub use aggregator::{OutputAggregator, Step, aggregate};
pub use config::{BackendKind, ExecConfig};
pub use extract::extract_code;
pub use message::{ExecutionState, KernelMessage, MessageContent};
pub use normalize::{is_error_response, normalize_error};
pub use outcome::ExecutionOutcome;
pub use traits::{BackendError, BackendFactory, ExecutionBackend, MessageSource};
