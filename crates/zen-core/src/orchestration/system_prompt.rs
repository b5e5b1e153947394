//! System prompt for the agent loop

use std::path::Path;

use crate::tools::ToolDefinition;

/// System prompt configuration and generation
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    base: String,
    context: Option<String>,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPrompt {
    pub fn new() -> Self {
        Self::with_base(DEFAULT_SYSTEM_PROMPT)
    }

    /// Replace the built-in instructions, e.g. from `[model].system_prompt`
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            context: None,
        }
    }

    pub fn with_workspace_context(mut self, workspace_path: &Path) -> Self {
        self.context = Some(format!(
            "\n\n## Current Workspace\nRelative paths resolve against: {}",
            workspace_path.display()
        ));
        self
    }

    /// Build the final prompt, listing the tools that are actually registered
    pub fn build(&self, tools: &[ToolDefinition]) -> String {
        let mut prompt = self.base.clone();
        if !tools.is_empty() {
            prompt.push_str("\n\n## Available Tools\n");
            for tool in tools {
                prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            }
        }
        if let Some(ctx) = &self.context {
            prompt.push_str(ctx);
        }
        prompt
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Zen, an assistant that can act on the user's machine through tools.

Call a tool when the request needs information you do not have or an action you cannot take in text. Tool results come back as JSON; read them before deciding the next step. When a tool reports an error, explain it or try a different approach instead of repeating the same call.

Keep answers short. Once the task is done, reply with a final message and no further tool calls."#;
