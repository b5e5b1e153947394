//! Streaming client for OpenAI-compatible chat completion endpoints
//!
//! Sends `stream: true` requests and parses the server-sent events. Each
//! `choices[0].delta` becomes one [`StreamDelta`]; tool-call fragments keep
//! the `index` the server assigned.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};

use super::{DeltaStream, ModelClient, ModelRequest, StreamDelta, ToolCallDelta};
use crate::error::{Error, ModelError, Result};
use crate::session::{Role, Turn};

const DONE_MARKER: &str = "[DONE]";

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    /// Idle limit between reads of a streaming response
    const READ_TIMEOUT: Duration = Duration::from_secs(300);
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .build()
            .map_err(|e| Error::Model(ModelError::Request(e.to_string())))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// JSON body for a streaming completion
    pub fn request_body(request: &ModelRequest<'_>) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": to_openai_messages(request.turns),
            "stream": true,
        });

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters_schema(),
                        }
                    })
                })
                .collect();
        }
        body
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn open_stream(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<DeltaStream, ModelError> {
        let body = Self::request_body(&request);
        debug!(
            "POST {} (model {}, {} messages, {} tools)",
            self.endpoint(),
            request.model,
            request.turns.len(),
            request.tools.len()
        );

        let mut builder = self
            .http
            .post(self.endpoint())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: crate::formatting::truncate_str(&body, 500),
            });
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(e) if e.data.trim() == DONE_MARKER))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(event) => {
                        trace!("SSE: {}", event.data);
                        parse_chunk(&event.data).transpose()
                    }
                    Err(e) => Some(Err(ModelError::Stream(format!("SSE stream error: {}", e)))),
                })
            })
            .boxed();

        Ok(stream)
    }
}

fn to_openai_messages(turns: &[Turn]) -> Vec<Value> {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::Assistant if !turn.tool_calls().is_empty() => {
                let calls: Vec<Value> = turn
                    .tool_calls()
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments },
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": if turn.content.is_empty() { Value::Null } else { json!(turn.content) },
                    "tool_calls": calls,
                })
            }
            Role::Tool => {
                let call_id = turn
                    .tool_result_payload()
                    .map(|r| r.call_id.as_str())
                    .unwrap_or_default();
                json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": turn.content,
                })
            }
            role => json!({ "role": role.as_str(), "content": turn.content }),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn extract_api_error_message(event: &Value) -> Option<String> {
    let error = event.get("error")?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

/// Parse one SSE `data:` payload. `Ok(None)` for keep-alives and empty deltas.
fn parse_chunk(data: &str) -> std::result::Result<Option<StreamDelta>, ModelError> {
    if data.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(data)
        .map_err(|e| ModelError::Stream(format!("SSE parsing error: {}, data: {}", e, data)))?;

    if let Some(message) = extract_api_error_message(&value) {
        return Err(ModelError::Stream(format!("API error: {}", message)));
    }

    let chunk: ChatChunk = serde_json::from_value(value)
        .map_err(|e| ModelError::Stream(format!("SSE data schema error: {}, data: {}", e, data)))?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let delta = StreamDelta {
        text: choice.delta.content.filter(|c| !c.is_empty()),
        tool_calls: choice
            .delta
            .tool_calls
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect(),
    };

    Ok(if delta.is_empty() { None } else { Some(delta) })
}
