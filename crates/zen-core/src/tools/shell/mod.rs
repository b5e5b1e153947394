//! Shell tools

mod execute;

pub use execute::ExecuteShell;

use serde_json::{json, Value};
use zen_sandbox::SandboxResult;

use crate::error::ToolError;

/// Shape a finished process into a tool result
///
/// A zero exit yields `{stdout, stderr, exit_code}`. Anything else is an
/// execution failure carrying stderr, or the exit code when stderr is empty.
pub(crate) fn process_result(result: SandboxResult) -> Result<Value, ToolError> {
    if result.success() {
        return Ok(json!({
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exit_code": result.exit_code,
        }));
    }

    let stderr = result.stderr.trim();
    let message = if !stderr.is_empty() {
        stderr.to_string()
    } else {
        match result.exit_code {
            Some(code) => format!("Command exited with code {}", code),
            None => "Command terminated by signal".to_string(),
        }
    };
    Err(ToolError::ExecutionFailure(message))
}
