//! Read file tool

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::error::ToolError;
use crate::tools::{ParamType, Tool, ToolDefinition};

use super::{display_relative, resolve_path_arg};

/// Tool for reading a UTF-8 text file inside the workspace
pub struct ReadFile {
    def: ToolDefinition,
    base: PathBuf,
    max_bytes: u64,
}

impl ReadFile {
    pub fn new(base: PathBuf, max_bytes: usize) -> Self {
        Self {
            def: ToolDefinition::new("read_file", "Read the contents of a text file in the workspace.")
                .param("path", ParamType::String, "Path to the file, relative to the workspace"),
            base,
            max_bytes: max_bytes as u64,
        }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    fn check(&self, args: &Value) -> Result<(), ToolError> {
        resolve_path_arg(&self.base, args).map(|_| ())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let path = resolve_path_arg(&self.base, &args)?;
        let display = display_relative(&self.base, &path);

        let meta = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ToolError::ExecutionFailure(format!("File not found: {}", display))
            }
            _ => ToolError::from(e),
        })?;
        if meta.is_dir() {
            return Err(ToolError::ExecutionFailure(format!(
                "{} is a directory",
                display
            )));
        }
        if meta.len() > self.max_bytes {
            return Err(ToolError::ExecutionFailure(format!(
                "{} is {} bytes, larger than the {} byte limit",
                display,
                meta.len(),
                self.max_bytes
            )));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(json!({
            "path": display,
            "content": content,
        }))
    }
}
