//! Backend selection and timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment flag selecting the local kernel backend.
pub const ENV_USE_LOCAL_KERNEL: &str = "USE_LOCAL_KERNEL";
/// Interpreter command line for local kernels.
pub const ENV_INTERPRETER: &str = "CODECELL_INTERPRETER";
/// Per-read execution timeout, in seconds.
pub const ENV_EXEC_TIMEOUT: &str = "CODECELL_EXEC_TIMEOUT";
/// Readiness handshake timeout, in seconds.
pub const ENV_READY_TIMEOUT: &str = "CODECELL_READY_TIMEOUT";
/// HTTP request timeout for the remote backend, in seconds.
pub const ENV_HTTP_TIMEOUT: &str = "CODECELL_HTTP_TIMEOUT";

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
const DEFAULT_READY_TIMEOUT_SECS: u64 = 60;

/// Which message channel adapter is in effect for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Persistent interpreter process per conversation.
    Local,
    /// Network execution service keyed by conversation id.
    #[default]
    Remote,
}

/// Execution configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub backend: BackendKind,
    /// Interpreter command line, split shell-style.
    pub interpreter: String,
    pub read_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    /// Remote transport timeout; `None` leaves it to the HTTP client.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
            request_timeout_secs: None,
        }
    }
}

impl ExecConfig {
    /// Build from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let backend = match lookup(ENV_USE_LOCAL_KERNEL) {
            Some(flag) if flag.trim().eq_ignore_ascii_case("1") => BackendKind::Local,
            _ => BackendKind::Remote,
        };

        let interpreter = lookup(ENV_INTERPRETER)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.interpreter);

        Self {
            backend,
            interpreter,
            read_timeout_secs: parse_secs(&lookup, ENV_EXEC_TIMEOUT)
                .unwrap_or(defaults.read_timeout_secs),
            ready_timeout_secs: parse_secs(&lookup, ENV_READY_TIMEOUT)
                .unwrap_or(defaults.ready_timeout_secs),
            request_timeout_secs: parse_secs(&lookup, ENV_HTTP_TIMEOUT),
        }
    }

    /// Per-read timeout while draining a submission.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Bound on the readiness handshake.
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Remote transport timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(e) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid timeout: {e}");
            None
        }
    }
}
