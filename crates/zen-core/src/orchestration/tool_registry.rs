//! Tool Registry Factory Module
//!
//! Centralizes tool registration and provides a builder for customization.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use zen_sandbox::{CommandPolicy, ResourceLimits, SandboxConfig};

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::tools::code::ExecuteCode;
use crate::tools::filesystem::{ReadFile, WriteFile};
use crate::tools::shell::ExecuteShell;
use crate::tools::web::WebSearch;
use crate::tools::ToolRegistry;

/// Builder for creating a tool registry with customizable options
pub struct ToolRegistryBuilder {
    workspace: PathBuf,
    limits: ResourceLimits,
    policy: CommandPolicy,
    python: String,
    node: String,
    include_shell: bool,
    include_filesystem: bool,
    include_code: bool,
    include_web_search: bool,
}

impl ToolRegistryBuilder {
    /// Create a new builder with the given workspace path
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            limits: ResourceLimits::default(),
            policy: CommandPolicy::new(),
            python: "python3".to_string(),
            node: "node".to_string(),
            include_shell: true,
            include_filesystem: true,
            include_code: true,
            include_web_search: true,
        }
    }

    /// Builder populated from the `[tools]` config section
    pub fn from_config(config: &ToolsConfig, workspace: PathBuf) -> Result<Self> {
        let policy = CommandPolicy::new()
            .with_extra_patterns(&config.extra_denied_patterns)
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self::new(config.base_dir.clone().unwrap_or(workspace))
            .with_policy(policy)
            .with_timeout(config.timeout())
            .with_max_output(config.max_output_bytes)
            .with_interpreters(&config.python, &config.node)
            .with_shell(config.shell)
            .with_filesystem(config.filesystem)
            .with_code(config.code)
            .with_web_search(config.web_search))
    }

    /// Set the shell command policy
    pub fn with_policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the process wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits = self.limits.with_timeout(timeout);
        self
    }

    /// Set the combined stdout + stderr budget
    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.limits = self.limits.with_max_output(bytes);
        self
    }

    pub fn with_interpreters(mut self, python: &str, node: &str) -> Self {
        self.python = python.to_string();
        self.node = node.to_string();
        self
    }

    /// Enable/disable shell tools
    pub fn with_shell(mut self, enabled: bool) -> Self {
        self.include_shell = enabled;
        self
    }

    /// Enable/disable filesystem tools
    pub fn with_filesystem(mut self, enabled: bool) -> Self {
        self.include_filesystem = enabled;
        self
    }

    /// Enable/disable code execution
    pub fn with_code(mut self, enabled: bool) -> Self {
        self.include_code = enabled;
        self
    }

    /// Enable/disable web search
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.include_web_search = enabled;
        self
    }

    /// Build the tool registry with the configured options
    pub fn build(self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let sandbox = SandboxConfig::new(self.workspace.clone()).with_limits(self.limits);

        if self.include_shell {
            registry.register(Arc::new(ExecuteShell::new(
                Arc::new(self.policy),
                sandbox.clone(),
            )));
        }

        if self.include_filesystem {
            registry.register(Arc::new(ReadFile::new(
                self.workspace.clone(),
                self.limits.max_output_bytes,
            )));
            registry.register(Arc::new(WriteFile::new(self.workspace.clone())));
        }

        if self.include_code {
            registry.register(Arc::new(
                ExecuteCode::new(sandbox).with_interpreters(self.python, self.node),
            ));
        }

        if self.include_web_search {
            registry.register(Arc::new(WebSearch::new()));
        }

        registry
    }
}

/// Registry with every standard tool enabled and default limits
pub fn create_standard_tool_registry(workspace: PathBuf) -> ToolRegistry {
    ToolRegistryBuilder::new(workspace).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_order() {
        let registry = create_standard_tool_registry(std::env::temp_dir());
        assert_eq!(
            registry.names(),
            vec!["execute_shell", "read_file", "write_file", "execute_code", "web_search"]
        );
    }

    #[test]
    fn test_toggles() {
        let registry = ToolRegistryBuilder::new(std::env::temp_dir())
            .with_shell(false)
            .with_code(false)
            .build();
        assert_eq!(registry.names(), vec!["read_file", "write_file", "web_search"]);
    }

    #[test]
    fn test_from_config_rejects_bad_pattern() {
        let config = ToolsConfig {
            extra_denied_patterns: vec!["(unclosed".into()],
            ..Default::default()
        };
        let err = ToolRegistryBuilder::from_config(&config, std::env::temp_dir()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
