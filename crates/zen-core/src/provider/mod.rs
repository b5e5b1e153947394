//! Model-stream providers
//!
//! A provider opens one streaming completion per call and yields
//! [`StreamDelta`]s. Implementations:
//! - [`OpenAiCompatClient`] for OpenCode Zen and any other
//!   OpenAI-compatible `/chat/completions` endpoint
//! - [`GenAiClient`] for the providers genai supports (Anthropic, OpenAI,
//!   Gemini, Groq, DeepSeek, Ollama, ...)
//! - [`ScriptedClient`] replaying canned responses, for tests and offline runs

pub mod catalog;
mod genai_provider;
pub mod logging;
mod openai_compat;
mod scripted;

pub use genai_provider::GenAiClient;
pub use openai_compat::OpenAiCompatClient;
pub use scripted::{ScriptedClient, ScriptedResponse};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::error::{Error, ModelError, Result};
use crate::session::Turn;
use crate::tools::ToolDefinition;

/// Fragment of a tool call, tagged with its position in the response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One incremental event from the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDelta {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(fragment: ToolCallDelta) -> Self {
        Self {
            text: None,
            tool_calls: vec![fragment],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty) && self.tool_calls.is_empty()
    }
}

pub type DeltaStream = BoxStream<'static, std::result::Result<StreamDelta, ModelError>>;

/// Everything a provider needs to open a stream
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDefinition],
}

/// Model-stream collaborator
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short provider name, for logs
    fn name(&self) -> &str;

    /// Open a streaming completion. Errors here may be retried by the caller.
    async fn open_stream(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<DeltaStream, ModelError>;
}

/// Build the client selected by the `[model]` config section
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>> {
    match config.provider.as_str() {
        catalog::ZEN_PROVIDER | catalog::OPENAI_COMPATIBLE_PROVIDER => {
            let api_key = config.api_key();
            if api_key.is_none() && config.provider == catalog::ZEN_PROVIDER {
                return Err(Error::Model(ModelError::MissingApiKey(
                    config.api_key_env.clone(),
                )));
            }
            Ok(Arc::new(OpenAiCompatClient::new(
                config.resolved_base_url(),
                api_key,
            )?))
        }
        other => {
            tracing::debug!("Using genai client for provider '{}'", other);
            Ok(Arc::new(GenAiClient::new(config.api_key())))
        }
    }
}
