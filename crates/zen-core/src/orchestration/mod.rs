//! Orchestration building blocks shared by the agent loop and frontends
//!
//! - `ToolRegistryBuilder`: assembles the built-in tools from config
//! - `ToolExecutor`: validates, gates and runs a single tool call
//! - `SystemPrompt`: the instructions sent ahead of every conversation

mod executor;
mod system_prompt;
mod tool_registry;

pub use executor::{ExecutionOutcome, ToolExecutor};
pub use system_prompt::{SystemPrompt, DEFAULT_SYSTEM_PROMPT};
pub use tool_registry::{create_standard_tool_registry, ToolRegistryBuilder};
