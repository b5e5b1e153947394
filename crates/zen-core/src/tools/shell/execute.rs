//! Execute shell command tool

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use zen_sandbox::{CommandPolicy, SandboxConfig, run_bounded, shell_command};

use crate::error::ToolError;
use crate::tools::{ParamType, Tool, ToolDefinition};

use super::process_result;

/// Tool for executing shell commands
pub struct ExecuteShell {
    def: ToolDefinition,
    policy: Arc<CommandPolicy>,
    sandbox: SandboxConfig,
}

impl ExecuteShell {
    pub fn new(policy: Arc<CommandPolicy>, sandbox: SandboxConfig) -> Self {
        Self {
            def: ToolDefinition::new(
                "execute_shell",
                "Execute a shell command in the workspace and return its stdout, stderr and exit code.",
            )
            .param("command", ParamType::String, "The shell command to execute")
            .optional(
                "timeout",
                ParamType::Integer,
                "Timeout in seconds, capped at the configured maximum",
            ),
            policy,
            sandbox,
        }
    }

    fn command_arg(args: &Value) -> Result<&str, ToolError> {
        args["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments(vec!["command is required".into()]))
    }
}

#[async_trait]
impl Tool for ExecuteShell {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    fn check(&self, args: &Value) -> Result<(), ToolError> {
        self.policy.check(Self::command_arg(args)?)?;
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let command = Self::command_arg(&args)?;

        let max = self.sandbox.limits.timeout();
        let timeout = args["timeout"]
            .as_u64()
            .map(|secs| Duration::from_secs(secs).min(max))
            .unwrap_or(max);

        let mut sandbox = self.sandbox.clone();
        sandbox.limits = sandbox.limits.with_timeout(timeout);

        debug!("Running shell command (timeout {:?}): {}", timeout, command);
        let result = run_bounded(shell_command(command), &sandbox).await?;
        process_result(result)
    }
}
