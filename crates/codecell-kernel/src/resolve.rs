//! Interpreter executable resolution.

use std::path::{Path, PathBuf};

/// Resolve an executable by name.
///
/// The search order is:
/// 1. Explicit absolute paths that point at a file.
/// 2. The current process PATH via `which`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blank_name() {
        assert_eq!(resolve_executable_path("  ").await, None);
    }

    #[tokio::test]
    async fn test_absolute_path_to_file() {
        let exe = std::env::current_exe().unwrap();
        let resolved = resolve_executable_path(exe.to_str().unwrap()).await;
        assert_eq!(resolved, Some(exe));
    }

    #[tokio::test]
    async fn test_absolute_path_missing() {
        assert_eq!(
            resolve_executable_path("/nonexistent/bin/python3").await,
            None
        );
    }
}
