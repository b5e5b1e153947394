//! Process-level sandboxing
//!
//! Every process runs with a cleared environment, null stdin and its own
//! process group. On timeout or output overflow the whole group is killed
//! and the child is reaped before returning. If the caller drops the run
//! early (cancellation, an outer timeout) the group is killed as well.

use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::{SandboxConfig, SandboxError, SandboxResult};

#[cfg(not(windows))]
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Create a shell command configured for the current platform
///
/// On Windows, uses `cmd /C`. On Unix, uses `sh -c`.
pub fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Create a command running `script` through an interpreter program
pub fn interpreter_command(program: &str, script: &std::path::Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg(script);
    cmd
}

/// Run a prepared command under the limits in `config`
///
/// Returns the captured output for any exit status. Only a timeout, an
/// output overflow or an I/O failure produce an error.
pub async fn run_bounded(
    mut cmd: Command,
    config: &SandboxConfig,
) -> Result<SandboxResult, SandboxError> {
    let start = Instant::now();

    cmd.current_dir(&config.root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Set environment restrictions
    cmd.env_clear();

    #[cfg(windows)]
    {
        let path = std::env::var_os("PATH")
            .unwrap_or_else(|| r"C:\Windows\System32;C:\Windows".into());
        cmd.env("PATH", path);
        cmd.env("USERPROFILE", config.root.display().to_string());
    }

    #[cfg(not(windows))]
    {
        let path = std::env::var_os("PATH").unwrap_or_else(|| FALLBACK_PATH.into());
        cmd.env("PATH", path);
        cmd.env("HOME", config.root.display().to_string());
        cmd.env("LANG", "C.UTF-8");
    }

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;
    let pid = child.id();
    let mut group = GroupGuard { pid };
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let limit = config.limits.timeout();
    let max_output = config.limits.max_output_bytes;
    let used = AtomicUsize::new(0);

    let outcome = tokio::time::timeout(limit, async {
        let (out, err) = tokio::try_join!(
            read_capped(stdout, &used, max_output),
            read_capped(stderr, &used, max_output),
        )?;
        let status = child.wait().await?;
        Ok::<_, SandboxError>((out, err, status))
    })
    .await;

    group.disarm();
    match outcome {
        Ok(Ok((out, err, status))) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            debug!(
                "Process {:?} exited with {:?} in {}ms",
                pid,
                status.code(),
                duration_ms
            );
            Ok(SandboxResult {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
                duration_ms,
            })
        }
        Ok(Err(e)) => {
            terminate(&mut child, pid).await;
            Err(e)
        }
        Err(_) => {
            warn!("Process {:?} timed out after {:?}, killing", pid, limit);
            terminate(&mut child, pid).await;
            Err(SandboxError::Timeout(limit))
        }
    }
}

/// Read a pipe to the end, charging every chunk against a shared budget
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    used: &AtomicUsize,
    max: usize,
) -> Result<Vec<u8>, SandboxError> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let total = used.fetch_add(n, Ordering::Relaxed) + n;
        if total > max {
            return Err(SandboxError::OutputLimit(max));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

/// Kills the process group when dropped while still armed
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            debug!("Run abandoned, killing process group {}", pid);
            kill_group(pid);
        }
    }
}

fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("killpg({}) failed: {}", pid, e);
        }
    }

    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the child's process group and reap the child
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_group(pid);
    }

    // kill() also waits, so the child never lingers as a zombie
    if let Err(e) = child.kill().await {
        debug!("Failed to kill process {:?}: {}", pid, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ResourceLimits;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir, limits: ResourceLimits) -> SandboxConfig {
        SandboxConfig::new(dir.path()).with_limits(limits)
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, ResourceLimits::default());

        let result = run_bounded(shell_command("echo hello; echo oops >&2; exit 3"), &cfg)
            .await
            .unwrap();

        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.stderr.trim(), "oops");
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_runs_in_root_with_cleared_env() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, ResourceLimits::default());

        // SAFETY: test-local variable, not read concurrently by other tests
        unsafe { std::env::set_var("ZEN_SANDBOX_SECRET", "leak") };
        let result = run_bounded(shell_command("pwd; echo \"[$ZEN_SANDBOX_SECRET]\""), &cfg)
            .await
            .unwrap();

        let canonical = dunce::canonicalize(dir.path()).unwrap();
        let mut lines = result.stdout.lines();
        assert_eq!(
            dunce::canonicalize(lines.next().unwrap()).unwrap(),
            canonical
        );
        assert_eq!(lines.next(), Some("[]"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let cfg = config(
            &dir,
            ResourceLimits::default().with_timeout(Duration::from_millis(300)),
        );

        let start = Instant::now();
        let err = run_bounded(shell_command("sleep 30"), &cfg).await.unwrap_err();

        assert!(matches!(err, SandboxError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let dir = TempDir::new().unwrap();
        let cfg = config(
            &dir,
            ResourceLimits::default().with_timeout(Duration::from_millis(500)),
        );

        let err = run_bounded(shell_command("sleep 30 & echo $! > bg.pid; wait"), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));

        let pid = std::fs::read_to_string(dir.path().join("bg.pid")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Gone entirely, or at worst a zombie waiting on its new parent
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid.trim()));
        if let Ok(stat) = stat {
            let state = stat.rsplit(')').next().unwrap().trim().chars().next();
            assert_eq!(state, Some('Z'));
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_run_kills_process_group() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, ResourceLimits::default());

        // The caller gives up long before the sandbox's own timeout
        let abandoned = tokio::time::timeout(
            Duration::from_millis(500),
            run_bounded(shell_command("sleep 30 & echo $! > bg.pid; wait"), &cfg),
        )
        .await;
        assert!(abandoned.is_err());

        let pid = std::fs::read_to_string(dir.path().join("bg.pid")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid.trim()));
        if let Ok(stat) = stat {
            let state = stat.rsplit(')').next().unwrap().trim().chars().next();
            assert_eq!(state, Some('Z'));
        }
    }

    #[tokio::test]
    async fn test_output_limit() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, ResourceLimits::default().with_max_output(4096));

        let err = run_bounded(shell_command("yes"), &cfg).await.unwrap_err();
        assert!(matches!(err, SandboxError::OutputLimit(4096)));
    }

    #[tokio::test]
    async fn test_output_within_limit() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, ResourceLimits::default().with_max_output(4096));

        let result = run_bounded(shell_command("printf 'abc'"), &cfg).await.unwrap();
        assert_eq!(result.stdout, "abc");
        assert!(result.success());
    }
}
