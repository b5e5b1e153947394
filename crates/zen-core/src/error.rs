//! Error types for Zen Core

use std::time::Duration;
use thiserror::Error;
use zen_sandbox::SandboxError;

/// Result type alias using Zen Error
pub type Result<T> = std::result::Result<T, Error>;

/// Loop-level and infrastructure errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Model stream failed: {0}")]
    Model(#[from] ModelError),

    #[error("Iteration bound of {0} reached while the model was still requesting tools")]
    IterationBoundExceeded(usize),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable snake_case identifier used in error frames
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tool(e) => e.kind(),
            Self::Model(_) => "model_stream_failure",
            Self::IterationBoundExceeded(_) => "iteration_bound_exceeded",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Tool-level errors
///
/// These never abort the agent loop: they are reported back to the model as
/// the result of the call that caused them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {}", .0.join("; "))]
    InvalidArguments(Vec<String>),

    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    #[error("Path traversal: {0}")]
    PathTraversal(String),

    #[error("Execution timed out after {}ms", .0.as_millis())]
    ExecutionTimeout(Duration),

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Could not parse tool arguments: {0}")]
    ArgumentParseFailure(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "tool_not_found",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::ForbiddenOperation(_) => "forbidden_operation",
            Self::PathTraversal(_) => "path_traversal",
            Self::ExecutionTimeout(_) => "execution_timeout",
            Self::ExecutionFailure(_) => "execution_failure",
            Self::ArgumentParseFailure(_) => "argument_parse_failure",
        }
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::PolicyViolation(msg) => Self::ForbiddenOperation(msg),
            SandboxError::PathEscape { .. } => Self::PathTraversal(err.to_string()),
            SandboxError::Timeout(after) => Self::ExecutionTimeout(after),
            other => Self::ExecutionFailure(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        Self::ExecutionFailure(err.to_string())
    }
}

/// Model-stream collaborator errors
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Missing API key: set {0}")]
    MissingApiKey(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl ModelError {
    /// Whether opening the stream again could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Stream(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MissingApiKey(_) => false,
        }
    }
}
