//! Shell and code execution tests
//!
//! Runs `execute_shell` and `execute_code` through the executor so the
//! security gate, limits and execution records are all exercised.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use zen_core::error::ToolError;
use zen_core::orchestration::{ExecutionOutcome, ToolExecutor, ToolRegistryBuilder};
use zen_core::session::{ExecutionStatus, MemoryStore};

fn setup_workspace() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
    dir
}

fn executor(dir: &TempDir, timeout: Duration) -> (ToolExecutor, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let registry = ToolRegistryBuilder::new(dir.path().to_path_buf())
        .with_timeout(timeout)
        .with_interpreters("python3", "node")
        .build();
    (
        ToolExecutor::new(Arc::new(registry), store.clone(), timeout),
        store,
    )
}

async fn shell(executor: &ToolExecutor, command: &str) -> ExecutionOutcome {
    executor
        .execute("execute_shell", json!({ "command": command }), None)
        .await
}

mod policy_tests {
    use super::*;

    #[tokio::test]
    async fn test_denylisted_commands_never_run() {
        let dir = setup_workspace();
        let (executor, store) = executor(&dir, Duration::from_secs(5));

        for command in [
            "rm -rf /",
            "rm -fr ~",
            "sudo cat /etc/shadow",
            "echo x && sudo reboot",
            "mkfs.ext4 /dev/sda1",
            "dd if=/dev/zero of=/dev/sda",
            "echo pwned > /etc/passwd",
            ":(){ :|:& };:",
            "rm -rf a.txt",
            "cp a.txt /etc/cron.d/job",
            "cat a.txt | env sudo sh",
            "find / -delete",
        ] {
            let outcome = shell(&executor, command).await;
            assert!(
                matches!(outcome.result, Err(ToolError::ForbiddenOperation(_))),
                "{} should be forbidden, got {:?}",
                command,
                outcome.result
            );
        }

        // Nothing was deleted
        assert!(dir.path().join("a.txt").exists());

        let records = store.executions();
        assert_eq!(records.len(), 12);
        assert!(records.iter().all(|r| r.status == ExecutionStatus::Error));
    }

    #[tokio::test]
    async fn test_forbidden_output_shape() {
        let dir = setup_workspace();
        let (executor, _) = executor(&dir, Duration::from_secs(5));

        let output = shell(&executor, "sudo ls").await.output_value();
        assert_eq!(output["kind"], "forbidden_operation");
        assert!(output["error"].as_str().unwrap().contains("sudo ls"));
    }
}

#[cfg(unix)]
mod execute_shell_tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_workspace_files() {
        let dir = setup_workspace();
        let (executor, store) = executor(&dir, Duration::from_secs(5));

        let outcome = shell(&executor, "ls").await;
        let output = outcome.result.expect("ls should succeed");

        assert_eq!(output["stdout"], "a.txt\nb.txt\n");
        assert_eq!(output["exit_code"], 0);
        assert_eq!(store.executions()[0].status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let dir = setup_workspace();
        let (executor, _) = executor(&dir, Duration::from_secs(5));

        let outcome = shell(&executor, "echo oops >&2; exit 3").await;
        match outcome.result {
            Err(ToolError::ExecutionFailure(msg)) => assert!(msg.contains("oops")),
            other => panic!("expected execution failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = setup_workspace();
        let (executor, store) = executor(&dir, Duration::from_millis(500));

        let start = Instant::now();
        let outcome = shell(&executor, "sleep 30").await;

        assert!(matches!(outcome.result, Err(ToolError::ExecutionTimeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(store.executions()[0].status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_requested_timeout_is_capped() {
        let dir = setup_workspace();
        let (executor, _) = executor(&dir, Duration::from_millis(500));

        let start = Instant::now();
        let outcome = executor
            .execute(
                "execute_shell",
                json!({ "command": "sleep 30", "timeout": 60 }),
                None,
            )
            .await;

        assert!(matches!(outcome.result, Err(ToolError::ExecutionTimeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_invalid_timeout_type() {
        let dir = setup_workspace();
        let (executor, _) = executor(&dir, Duration::from_secs(5));

        let outcome = executor
            .execute(
                "execute_shell",
                json!({ "command": "ls", "timeout": "soon" }),
                None,
            )
            .await;
        assert!(matches!(outcome.result, Err(ToolError::InvalidArguments(_))));
    }
}

#[cfg(unix)]
mod execute_code_tests {
    use super::*;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_python_snippet() {
        if !python_available() {
            return;
        }
        let dir = setup_workspace();
        let (executor, _) = executor(&dir, Duration::from_secs(10));

        let outcome = executor
            .execute(
                "execute_code",
                json!({ "language": "python", "code": "print(6 * 7)" }),
                None,
            )
            .await;

        let output: Value = outcome.result.expect("python should run");
        assert_eq!(output["stdout"], "42\n");
        assert_eq!(output["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let dir = setup_workspace();
        let (executor, store) = executor(&dir, Duration::from_secs(5));

        let outcome = executor
            .execute(
                "execute_code",
                json!({ "language": "cobol", "code": "DISPLAY 'HI'." }),
                None,
            )
            .await;

        assert!(matches!(outcome.result, Err(ToolError::InvalidArguments(_))));
        assert_eq!(store.executions().len(), 1);
    }
}
