//! Multi-provider streaming through genai
//!
//! genai resolves the backend from the model name. Tool calls arrive as
//! complete `ToolCallChunk`s, so each new call id gets the next index and
//! its whole argument text in a single fragment.

use async_trait::async_trait;
use futures::{future, StreamExt};
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent, Tool, ToolCall, ToolResponse};
use genai::resolver::{AuthData, AuthResolver};
use genai::Client;
use genai::WebConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{DeltaStream, ModelClient, ModelRequest, StreamDelta, ToolCallDelta};
use crate::error::ModelError;
use crate::session::{Role, Turn};

pub struct GenAiClient {
    client: Client,
}

impl GenAiClient {
    /// Default timeout for LLM API requests (5 minutes)
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Create WebConfig with appropriate timeouts for LLM requests
    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a client. Without a key, genai falls back to the provider's
    /// usual environment variable (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, ...).
    pub fn new(api_key: Option<String>) -> Self {
        let mut builder = Client::builder().with_web_config(Self::default_web_config());

        if let Some(api_key) = api_key {
            let auth_resolver = AuthResolver::from_resolver_fn(
                move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                    Ok(Some(AuthData::from_single(api_key.clone())))
                },
            );
            builder = builder.with_auth_resolver(auth_resolver);
        }

        Self {
            client: builder.build(),
        }
    }

    fn build_request(request: &ModelRequest<'_>) -> ChatRequest {
        let mut chat_req = ChatRequest::default();

        for turn in request.turns {
            chat_req = append_turn(chat_req, turn);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Tool> = request
                .tools
                .iter()
                .map(|t| {
                    Tool::new(&t.name)
                        .with_description(&t.description)
                        .with_schema(t.parameters_schema())
                })
                .collect();
            chat_req = chat_req.with_tools(tools);
        }
        chat_req
    }
}

fn append_turn(chat_req: ChatRequest, turn: &Turn) -> ChatRequest {
    match turn.role {
        Role::System => chat_req.with_system(&turn.content),
        Role::User => chat_req.append_message(ChatMessage::user(&turn.content)),
        Role::Assistant if !turn.tool_calls().is_empty() => {
            let chat_req = if turn.content.is_empty() {
                chat_req
            } else {
                chat_req.append_message(ChatMessage::assistant(&turn.content))
            };
            let calls: Vec<ToolCall> = turn
                .tool_calls()
                .iter()
                .map(|c| ToolCall {
                    call_id: c.id.clone(),
                    fn_name: c.name.clone(),
                    fn_arguments: serde_json::from_str(&c.arguments)
                        .unwrap_or_else(|_| Value::String(c.arguments.clone())),
                    thought_signatures: None,
                })
                .collect();
            chat_req.append_message(calls)
        }
        Role::Assistant => chat_req.append_message(ChatMessage::assistant(&turn.content)),
        Role::Tool => {
            let call_id = turn
                .tool_result_payload()
                .map(|r| r.call_id.clone())
                .unwrap_or_default();
            chat_req.append_message(ToolResponse::new(call_id, turn.content.clone()))
        }
    }
}

/// Map one genai event. Outer `None` ends the stream, inner `None` skips.
fn map_event<E: std::fmt::Debug>(
    seen: &mut HashMap<String, usize>,
    event: Result<ChatStreamEvent, E>,
) -> Option<Option<Result<StreamDelta, ModelError>>> {
    match event {
        Ok(ChatStreamEvent::Chunk(chunk)) => Some(Some(Ok(StreamDelta::text(chunk.content)))),
        Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
            let call = tc.tool_call;
            if seen.contains_key(&call.call_id) {
                debug!("Ignoring repeated tool call chunk for {}", call.call_id);
                return Some(None);
            }
            let index = seen.len();
            seen.insert(call.call_id.clone(), index);

            let arguments = match call.fn_arguments {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some(Some(Ok(StreamDelta::tool_call(ToolCallDelta {
                index,
                id: Some(call.call_id),
                name: Some(call.fn_name),
                arguments: Some(arguments),
            }))))
        }
        Ok(ChatStreamEvent::End(_)) => None,
        Ok(_) => Some(None),
        Err(e) => Some(Some(Err(ModelError::Stream(format!("GenAI stream error: {:?}", e))))),
    }
}

#[async_trait]
impl ModelClient for GenAiClient {
    fn name(&self) -> &str {
        "genai"
    }

    async fn open_stream(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<DeltaStream, ModelError> {
        let chat_req = Self::build_request(&request);

        let response = self
            .client
            .exec_chat_stream(request.model, chat_req, None)
            .await
            .map_err(|e| ModelError::Request(format!("GenAI error: {:?}", e)))?;

        let stream = response
            .stream
            .scan(HashMap::new(), |seen, event| future::ready(map_event(seen, event)))
            .filter_map(future::ready)
            .boxed();
        Ok(stream)
    }
}
