//! Zen Sandbox - guarded execution for agent tools
//!
//! This crate decides whether a command or path may be touched at all
//! ([`policy`]) and runs the processes that pass those checks under a
//! wall-clock limit and an output budget ([`process`]).

pub mod policy;
pub mod process;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use policy::{CommandPolicy, resolve_within};
pub use process::{interpreter_command, run_bounded, shell_command};

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Working directory for spawned processes
    pub root: PathBuf,
    /// Resource limits
    pub limits: ResourceLimits,
}

impl SandboxConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("zen-sandbox"))
    }
}

/// Resource limits for sandboxed processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall-clock limit in milliseconds
    pub timeout_ms: u64,
    /// Combined stdout + stderr budget in bytes
    pub max_output_bytes: usize,
}

impl ResourceLimits {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_OUTPUT: usize = 1024 * 1024; // 1 MiB

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_ms: Self::DEFAULT_TIMEOUT.as_millis() as u64,
            max_output_bytes: Self::DEFAULT_MAX_OUTPUT,
        }
    }
}

/// Sandbox execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl SandboxResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Sandbox errors
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Policy violation: {0}")]
    PolicyViolation(String),
    #[error("Path {path} resolves outside of {base}")]
    PathEscape { path: String, base: String },
    #[error("Process timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Process output exceeded {0} bytes")]
    OutputLimit(usize),
    #[error("Failed to spawn process: {0}")]
    Spawn(std::io::Error),
    #[error("Invalid policy pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
