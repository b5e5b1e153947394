//! Write file tool

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use crate::error::ToolError;
use crate::tools::{ParamType, Tool, ToolDefinition};

use super::{display_relative, resolve_path_arg};

/// Tool for writing a text file inside the workspace
pub struct WriteFile {
    def: ToolDefinition,
    base: PathBuf,
}

impl WriteFile {
    pub fn new(base: PathBuf) -> Self {
        Self {
            def: ToolDefinition::new(
                "write_file",
                "Write content to a file in the workspace, creating parent directories as needed. Overwrites existing files.",
            )
            .param("path", ParamType::String, "Path to the file, relative to the workspace")
            .param("content", ParamType::String, "Content to write"),
            base,
        }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    fn check(&self, args: &Value) -> Result<(), ToolError> {
        resolve_path_arg(&self.base, args).map(|_| ())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let path = resolve_path_arg(&self.base, &args)?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments(vec!["content is required".into()]))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        let shown = display_relative(&self.base, &path);
        debug!("Wrote {} bytes to {}", content.len(), shown);
        Ok(json!({
            "path": shown,
            "bytes_written": content.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFile::new(dir.path().to_path_buf());

        let out = tool
            .execute(json!({"path": "a/b/c.txt", "content": "nested"}))
            .await
            .unwrap();
        assert_eq!(out["bytes_written"], 6);
        assert_eq!(out["path"], "a/b/c.txt");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/b/c.txt")).unwrap(),
            "nested"
        );
    }

    #[tokio::test]
    async fn test_write_outside_base_rejected() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFile::new(dir.path().to_path_buf());
        let err = tool
            .execute(json!({"path": "../escape.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "path_traversal");
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }
}
