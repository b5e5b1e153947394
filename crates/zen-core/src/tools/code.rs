//! Code execution tool
//!
//! Source is written to a scratch file and run through an interpreter
//! subprocess under the same limits as shell commands.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use zen_sandbox::{SandboxConfig, interpreter_command, run_bounded};

use crate::error::ToolError;
use crate::tools::shell::process_result;
use crate::tools::{ParamType, Tool, ToolDefinition};

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
}

impl Language {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Self::Python),
            "javascript" | "js" | "node" | "nodejs" => Some(Self::JavaScript),
            _ => None,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::JavaScript => "js",
        }
    }
}

/// Scratch file removed when dropped, on every exit path
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    async fn create(dir: &Path, language: Language, code: &str) -> Result<Self, ToolError> {
        let path = dir.join(format!(
            "zen_scratch_{}.{}",
            Uuid::new_v4().simple(),
            language.extension()
        ));
        tokio::fs::write(&path, code).await?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove scratch file {:?}: {}", self.path, e);
            }
        }
    }
}

/// Tool for running Python or JavaScript snippets
pub struct ExecuteCode {
    def: ToolDefinition,
    sandbox: SandboxConfig,
    scratch_dir: PathBuf,
    python: String,
    node: String,
}

impl ExecuteCode {
    pub fn new(sandbox: SandboxConfig) -> Self {
        Self {
            def: ToolDefinition::new(
                "execute_code",
                "Execute a Python or JavaScript snippet and return its output.",
            )
            .param("language", ParamType::String, "Either \"python\" or \"javascript\"")
            .param("code", ParamType::String, "Source code to run"),
            sandbox,
            scratch_dir: std::env::temp_dir(),
            python: "python3".to_string(),
            node: "node".to_string(),
        }
    }

    /// Override the interpreter programs
    pub fn with_interpreters(mut self, python: impl Into<String>, node: impl Into<String>) -> Self {
        self.python = python.into();
        self.node = node.into();
        self
    }

    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = dir;
        self
    }

    fn language_arg(args: &Value) -> Result<Language, ToolError> {
        let name = args["language"].as_str().unwrap_or_default();
        Language::parse(name).ok_or_else(|| {
            ToolError::InvalidArguments(vec![format!(
                "unsupported language '{}', expected python or javascript",
                name
            )])
        })
    }
}

#[async_trait]
impl Tool for ExecuteCode {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    fn check(&self, args: &Value) -> Result<(), ToolError> {
        Self::language_arg(args).map(|_| ())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let language = Self::language_arg(&args)?;
        let code = args["code"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments(vec!["code is required".into()]))?;

        let program = match language {
            Language::Python => &self.python,
            Language::JavaScript => &self.node,
        };

        let scratch = ScratchFile::create(&self.scratch_dir, language, code).await?;
        debug!("Running {:?} snippet via {} ({})", language, program, scratch.path().display());
        let result = run_bounded(interpreter_command(program, scratch.path()), &self.sandbox).await?;
        process_result(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn scratch_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("zen_scratch_")
            })
            .count()
    }

    #[test]
    fn test_language_parse() {
        assert_eq!(Language::parse("Python"), Some(Language::Python));
        assert_eq!(Language::parse("javascript"), Some(Language::JavaScript));
        assert_eq!(Language::parse("ruby"), None);
    }

    #[test]
    fn test_check_rejects_unknown_language() {
        let dir = TempDir::new().unwrap();
        let tool = ExecuteCode::new(SandboxConfig::new(dir.path()));
        let err = tool.check(&json!({"language": "ruby", "code": "puts 1"})).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[tokio::test]
    async fn test_scratch_file_removed_after_run() {
        let work = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        // `sh` stands in for an interpreter so the test has no python/node dependency
        let tool = ExecuteCode::new(SandboxConfig::new(work.path()))
            .with_interpreters("sh", "sh")
            .with_scratch_dir(scratch.path().to_path_buf());

        let out = tool
            .execute(json!({"language": "python", "code": "echo from-script"}))
            .await
            .unwrap();
        assert_eq!(out["stdout"], "from-script\n");
        assert_eq!(scratch_count(scratch.path()), 0);

        let err = tool
            .execute(json!({"language": "javascript", "code": "exit 2"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "execution_failure");
        assert_eq!(scratch_count(scratch.path()), 0);
    }
}
