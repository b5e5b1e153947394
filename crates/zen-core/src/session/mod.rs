//! Session module - conversation state and the agent loop
//!
//! - `ConversationContext`: the append-only list of turns for one request
//! - `StreamAccumulator`: rebuilds text and tool calls from a delta stream
//! - `AgentLoop`: streams, dispatches tools and feeds results back
//! - `ConversationStore`: where conversations, messages and tool execution
//!   records are written
//!
//! # Data flow
//!
//! ```text
//! user message ──▶ AgentLoop ──▶ ModelClient::open_stream
//!                     ▲                  │ deltas
//!                     │                  ▼
//!                tool turns      StreamAccumulator ──▶ text frames
//!                     │                  │ tool calls
//!                     └── ToolExecutor ◀─┘ (one at a time)
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! use zen_core::session::AgentLoop;
//!
//! let agent = AgentLoop::from_config(&config, workspace).await?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! tokio::spawn(async move {
//!     while let Some(frame) = rx.recv().await {
//!         print!("{}", frame.encode().unwrap());
//!     }
//! });
//! let outcome = agent.handle_message(None, "list files", &tx).await?;
//! ```

mod accumulator;
mod agent_loop;
mod context;
pub mod persistence;

pub use accumulator::{AccumulatedTurn, StreamAccumulator};
pub use agent_loop::{AgentLoop, Backoff, FixedBackoff, LoopConfig, LoopOutcome, NoBackoff};
pub use context::{ConversationContext, Role, ToolCall, ToolResult, Turn, TurnPayload};
pub use persistence::{
    ConversationStore, ExecutionStatus, JsonlStore, MemoryStore, PendingExecution,
    StoredConversation, StoredMessage, ToolExecutionRecord,
};
