//! Persistent local interpreter kernels.
//!
//! Provides:
//! - `LocalKernel` - One interpreter process per conversation
//! - `LocalKernelFactory` - Backend factory for the session registry
//! - `KernelPeer` - Line-delimited JSON protocol over stdin/stdout
//! - Interpreter command building and executable resolution

pub mod command;
pub mod kernel;
pub mod peer;
pub mod resolve;

pub use command::{CommandBuildError, CommandParts, InterpreterCommand};
pub use kernel::{LocalKernel, LocalKernelFactory};
pub use peer::{KernelMessages, KernelPeer, PeerError};
pub use resolve::resolve_executable_path;

/// Source of the driver program run inside the interpreter.
pub const DRIVER_SOURCE: &str = include_str!("driver.py");
