//! Wire protocol between execution clients and an execution service.

use serde::{Deserialize, Serialize};

/// Path of the execute endpoint, relative to the service base URL.
pub const EXECUTE_PATH: &str = "/execute";
/// Path of the shutdown endpoint, relative to the service base URL.
pub const SHUTDOWN_PATH: &str = "/shutdown";

/// Run code in the conversation's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub convid: String,
    pub code: String,
}

/// Aggregated result of one submission.
///
/// `result` is raw text: tracebacks are not normalized server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub result: String,
    #[serde(default)]
    pub new_kernel_created: bool,
}

/// Tear down the conversation's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub convid: String,
}

/// Whether a live session was torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub shutdown: bool,
}

/// Error body returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Join a base URL and an endpoint path.
#[must_use]
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}
