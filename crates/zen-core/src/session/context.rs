//! Conversation context
//!
//! The ordered turn list a single loop invocation sends to the model. Turns
//! are only ever appended.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A finalized tool call request, with the argument text exactly as streamed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    /// Parse the argument text. Blank text means "no arguments".
    pub fn parse_arguments(&self) -> Result<Value, ToolError> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments).map_err(|e| {
            ToolError::ArgumentParseFailure(format!(
                "{} in arguments for '{}': {}",
                e,
                self.name,
                crate::formatting::truncate_str(&self.arguments, 200)
            ))
        })
    }
}

/// Outcome of one call, as fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub success: bool,
    pub output: Value,
}

/// Structured part of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnPayload {
    ToolCalls { calls: Vec<ToolCall> },
    ToolResult { result: ToolResult },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TurnPayload>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            payload: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            payload: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            payload: None,
        }
    }

    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            payload: Some(TurnPayload::ToolCalls { calls }),
        }
    }

    /// Tool turn; `content` is the JSON text of the output
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.output.to_string(),
            payload: Some(TurnPayload::ToolResult { result }),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.payload {
            Some(TurnPayload::ToolCalls { calls }) => calls,
            _ => &[],
        }
    }

    pub fn tool_result_payload(&self) -> Option<&ToolResult> {
        match &self.payload {
            Some(TurnPayload::ToolResult { result }) => Some(result),
            _ => None,
        }
    }
}

/// Append-only sequence of turns
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously stored turns
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
