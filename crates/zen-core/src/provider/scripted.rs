//! Scripted model client
//!
//! Replays a queue of canned responses, one per `open_stream` call, and
//! records every request it receives.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::{DeltaStream, ModelClient, ModelRequest, StreamDelta, ToolCallDelta};
use crate::error::ModelError;
use crate::session::Turn;

/// One canned response
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Stream these deltas, then end normally
    Deltas(Vec<StreamDelta>),
    /// Fail to open the stream
    OpenError(ModelError),
    /// Stream these deltas, then fail
    StreamError(Vec<StreamDelta>, ModelError),
}

impl ScriptedResponse {
    /// A plain text answer
    pub fn text(text: &str) -> Self {
        Self::Deltas(vec![StreamDelta::text(text)])
    }

    /// Optional text followed by tool calls `(id, name, arguments)`, each
    /// call's arguments split over two fragments
    pub fn tool_calls(text: &str, calls: &[(&str, &str, &str)]) -> Self {
        let mut deltas = Vec::new();
        if !text.is_empty() {
            deltas.push(StreamDelta::text(text));
        }
        for (index, (id, name, arguments)) in calls.iter().enumerate() {
            let mid = arguments
                .char_indices()
                .map(|(i, _)| i)
                .nth(arguments.chars().count() / 2)
                .unwrap_or(arguments.len());
            let (head, tail) = arguments.split_at(mid);

            deltas.push(StreamDelta::tool_call(ToolCallDelta {
                index,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: Some(head.to_string()),
            }));
            deltas.push(StreamDelta::tool_call(ToolCallDelta {
                index,
                arguments: Some(tail.to_string()),
                ..Default::default()
            }));
        }
        Self::Deltas(deltas)
    }
}

pub struct ScriptedClient {
    script: Mutex<VecDeque<ScriptedResponse>>,
    repeat_last: bool,
    requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedClient {
    pub fn new(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same response
    pub fn repeating(response: ScriptedResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new([response])
        }
    }

    /// Context sent with each call so far
    pub fn requests(&self) -> Vec<Vec<Turn>> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self) -> Option<ScriptedResponse> {
        let mut script = self.script.lock();
        if self.repeat_last && script.len() == 1 {
            return script.front().cloned();
        }
        script.pop_front()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_stream(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<DeltaStream, ModelError> {
        self.requests.lock().push(request.turns.to_vec());

        match self.next_response() {
            Some(ScriptedResponse::Deltas(deltas)) => {
                Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
            }
            Some(ScriptedResponse::OpenError(e)) => Err(e),
            Some(ScriptedResponse::StreamError(deltas, e)) => Ok(stream::iter(
                deltas.into_iter().map(Ok).chain(std::iter::once(Err(e))),
            )
            .boxed()),
            None => Err(ModelError::Status {
                status: 404,
                body: "script exhausted".into(),
            }),
        }
    }
}
