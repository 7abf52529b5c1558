//! End-to-end tests against a real `python3`; skipped when none is on PATH.

use std::time::Duration;

use codecell_core::{ExecConfig, ExecutionBackend, ExecutionOutcome};
use codecell_kernel::{LocalKernel, resolve_executable_path};

async fn python_kernel(read_timeout_secs: u64) -> Option<LocalKernel> {
    if resolve_executable_path("python3").await.is_none() {
        eprintln!("python3 not found; skipping");
        return None;
    }
    let config = ExecConfig {
        read_timeout_secs,
        ..ExecConfig::default()
    };
    Some(LocalKernel::start("it-conv", &config).await.unwrap())
}

#[tokio::test]
async fn test_state_persists_across_submissions() {
    let Some(mut kernel) = python_kernel(30).await else {
        return;
    };
    assert_eq!(kernel.execute("x = 42").await.unwrap(), ExecutionOutcome::NoOutput);
    let outcome = kernel.execute("print(x * 2)").await.unwrap();
    assert!(outcome.into_feedback().contains("84"));
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_trailing_expression_is_result() {
    let Some(mut kernel) = python_kernel(30).await else {
        return;
    };
    assert_eq!(
        kernel.execute("print('a')\n1 + 1").await.unwrap(),
        ExecutionOutcome::Output("a\n2".into())
    );
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_name_error_is_bounded_excerpt() {
    let Some(mut kernel) = python_kernel(30).await else {
        return;
    };
    let code = "def f():\n    return g()\ndef g():\n    return h()\ndef h():\n    return undefined_variable\nf()";
    let outcome = kernel.execute(code).await.unwrap();
    assert!(outcome.is_error());
    let raw = outcome.clone().into_raw_text();
    let feedback = outcome.into_feedback();
    assert!(feedback.contains("NameError: name 'undefined_variable' is not defined"));
    assert!(feedback.contains("Cell In["));
    assert!(feedback.len() < raw.len());
    assert!(!feedback.contains("return h()"));
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_timeout_then_recover() {
    let Some(mut kernel) = python_kernel(1).await else {
        return;
    };
    let outcome = kernel
        .execute("import time\ntime.sleep(3)\nprint('late')")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ExecutionOutcome::TimedOut {
            after: Duration::from_secs(1)
        }
    );

    // the sleeping cell finishes first; its output carries the old token
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        kernel.execute("print('next')").await.unwrap(),
        ExecutionOutcome::Output("next\n".into())
    );
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subprocess_output_is_captured_in_order() {
    let Some(mut kernel) = python_kernel(30).await else {
        return;
    };
    let code = r#"import subprocess, sys
subprocess.run([sys.executable, "-c", "import os; os.write(1, b'sub')"])
print('after')"#;
    assert_eq!(
        kernel.execute(code).await.unwrap(),
        ExecutionOutcome::Output("subafter\n".into())
    );
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_raw_fd_write_keeps_result() {
    let Some(mut kernel) = python_kernel(30).await else {
        return;
    };
    assert_eq!(
        kernel.execute("import os\nos.write(1, b'raw')").await.unwrap(),
        ExecutionOutcome::Output("raw3".into())
    );
    // stderr has its own pipe; order across the two is not fixed
    let mixed = kernel
        .execute("os.write(2, b'E')\nprint('next')")
        .await
        .unwrap()
        .into_feedback();
    assert!(mixed.contains('E'));
    assert!(mixed.contains("next\n"));
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_child_process_cannot_read_requests() {
    let Some(mut kernel) = python_kernel(30).await else {
        return;
    };
    let code = r#"import subprocess, sys
r = subprocess.run([sys.executable, "-c", "import sys; print(len(sys.stdin.read()))"])"#;
    assert_eq!(
        kernel.execute(code).await.unwrap(),
        ExecutionOutcome::Output("0\n".into())
    );
    assert_eq!(
        kernel.execute("print('still alive')").await.unwrap(),
        ExecutionOutcome::Output("still alive\n".into())
    );
    kernel.shutdown().await.unwrap();
}
