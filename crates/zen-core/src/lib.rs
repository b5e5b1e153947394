//! Zen Core - tool-calling agent loop
//!
//! This crate provides the core functionality for the Zen agent:
//! - Tool system: registry, JSON schemas and the built-in tools
//! - Tool executor with a command denylist and workspace path confinement
//! - Streaming model clients (OpenAI-compatible SSE and genai)
//! - The bounded agent loop and its NDJSON frame protocol
//! - Conversation persistence

pub mod config;
pub mod error;
pub mod formatting;
pub mod orchestration;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod tools;

pub use config::{Config, ConfigManager};
pub use error::{Error, ModelError, Result, ToolError};
pub use formatting::{conversation_title, truncate_str};
pub use protocol::{Frame, FrameWriter};
pub use provider::{create_client, ModelClient, ModelRequest, StreamDelta, ToolCallDelta};
pub use tools::{ParamSpec, ParamType, Tool, ToolDefinition, ToolRegistry};

// Orchestration exports
pub use orchestration::{
    create_standard_tool_registry, ExecutionOutcome, SystemPrompt, ToolExecutor,
    ToolRegistryBuilder,
};

// Session exports
pub use session::{
    AgentLoop, ConversationContext, ConversationStore, JsonlStore, LoopConfig, LoopOutcome,
    MemoryStore, Turn,
};
