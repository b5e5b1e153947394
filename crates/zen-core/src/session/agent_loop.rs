//! Agent Loop - the bounded generate, act, observe cycle
//!
//! For one inbound message the loop:
//! - opens a model stream (retrying the open with a fixed backoff)
//! - forwards text fragments as they arrive and accumulates tool calls
//! - dispatches the finished calls one at a time, in index order
//! - appends each result to the context and streams again
//!
//! It stops when the model answers without tool calls, or fails when the
//! iteration bound is reached, the model stream cannot be opened, or the
//! caller cancels. Every stop other than a normal finish ends the frame
//! stream with an error frame.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::accumulator::{AccumulatedTurn, StreamAccumulator};
use super::context::{ConversationContext, Role, ToolCall, ToolResult, Turn};
use super::persistence::{ConversationStore, JsonlStore, MemoryStore};
use crate::config::{Config, StorageBackend};
use crate::error::{Error, Result, ToolError};
use crate::formatting::conversation_title;
use crate::orchestration::{SystemPrompt, ToolExecutor, ToolRegistryBuilder};
use crate::protocol::Frame;
use crate::provider::logging::{log_model_interaction, LogConfig};
use crate::provider::{create_client, DeltaStream, ModelClient, ModelRequest};
use crate::tools::{ToolDefinition, ToolRegistry};

/// Delay between attempts to open the model stream
#[async_trait]
pub trait Backoff: Send + Sync {
    /// Wait before attempt `attempt + 1`
    async fn wait(&self, attempt: u32);
}

/// Same delay before every retry
pub struct FixedBackoff(pub Duration);

#[async_trait]
impl Backoff for FixedBackoff {
    async fn wait(&self, _attempt: u32) {
        tokio::time::sleep(self.0).await;
    }
}

/// Retry immediately
pub struct NoBackoff;

#[async_trait]
impl Backoff for NoBackoff {
    async fn wait(&self, _attempt: u32) {}
}

/// Settings for one loop instance
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub provider: String,
    /// Maximum number of model calls per inbound message
    pub max_iterations: usize,
    /// Attempts to open each model stream, including the first
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub tool_timeout: Duration,
    pub system_prompt: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl LoopConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.model.clone(),
            provider: config.model.provider.clone(),
            max_iterations: config.agent.max_iterations,
            retry_attempts: config.agent.retry_attempts,
            retry_backoff: config.agent.retry_backoff(),
            tool_timeout: config.tools.timeout(),
            system_prompt: config.model.system_prompt.clone(),
        }
    }

    fn prompt(&self) -> SystemPrompt {
        match &self.system_prompt {
            Some(base) => SystemPrompt::with_base(base.clone()),
            None => SystemPrompt::new(),
        }
    }
}

/// How a successful loop ended
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub conversation_id: String,
    pub final_text: String,
    /// Model calls made
    pub iterations: usize,
}

enum LoopState {
    Streaming,
    Dispatching {
        calls: Vec<ToolCall>,
        message_id: Option<String>,
    },
    Done(String),
}

pub struct AgentLoop {
    client: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    store: Arc<dyn ConversationStore>,
    tools: Vec<ToolDefinition>,
    system_prompt: String,
    config: LoopConfig,
    backoff: Arc<dyn Backoff>,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(
        client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        config: LoopConfig,
    ) -> Self {
        let tools = registry.list();
        let system_prompt = config.prompt().build(&tools);
        let cancel = CancellationToken::new();
        let executor = ToolExecutor::new(registry, store.clone(), config.tool_timeout)
            .with_cancellation(cancel.clone());

        Self {
            client,
            executor,
            store,
            tools,
            system_prompt,
            backoff: Arc::new(FixedBackoff(config.retry_backoff)),
            config,
            cancel,
        }
    }

    /// Wire up a loop from configuration: model client, built-in tools and
    /// the configured store
    pub async fn from_config(config: &Config, workspace: PathBuf) -> Result<Self> {
        let client = create_client(&config.model)?;
        let registry = ToolRegistryBuilder::from_config(&config.tools, workspace.clone())?.build();
        let store: Arc<dyn ConversationStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Jsonl => Arc::new(JsonlStore::open(config.storage.data_dir()).await?),
        };

        let config = LoopConfig::from_config(config);
        let prompt = config.prompt().with_workspace_context(&workspace);
        Ok(Self::new(client, Arc::new(registry), store, config).with_system_prompt(prompt))
    }

    pub fn with_system_prompt(mut self, prompt: SystemPrompt) -> Self {
        self.system_prompt = prompt.build(&self.tools);
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Use an externally owned token, e.g. one tied to Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Handle one user message. Starts a conversation unless
    /// `conversation_id` names an existing one.
    ///
    /// Frames go to `tx` in emission order. On failure the last frame sent is
    /// an error frame and the same error is returned.
    pub async fn handle_message(
        &self,
        conversation_id: Option<String>,
        message: &str,
        tx: &mpsc::Sender<Frame>,
    ) -> Result<LoopOutcome> {
        let result = self.handle_message_inner(conversation_id, message, tx).await;
        if let Err(e) = &result {
            error!("Agent loop failed: {}", e);
            self.emit(tx, Frame::from_error(e)).await;
        }
        result
    }

    async fn handle_message_inner(
        &self,
        conversation_id: Option<String>,
        message: &str,
        tx: &mpsc::Sender<Frame>,
    ) -> Result<LoopOutcome> {
        let mut context = ConversationContext::new();
        context.push(Turn::system(self.system_prompt.clone()));

        let conversation_id = match conversation_id {
            Some(id) => {
                let history = self.store.load_messages(&id).await?;
                debug!("Resuming conversation {} with {} turns", id, history.len());
                for turn in history.into_iter().filter(|t| t.role != Role::System) {
                    context.push(turn);
                }
                id
            }
            None => {
                let id = self.store.create_conversation(&conversation_title(message)).await?;
                info!("Started conversation {}", id);
                id
            }
        };

        let user_turn = Turn::user(message);
        self.store.append_message(&conversation_id, &user_turn).await?;
        context.push(user_turn);

        self.run(&conversation_id, &mut context, tx).await
    }

    async fn run(
        &self,
        conversation_id: &str,
        context: &mut ConversationContext,
        tx: &mpsc::Sender<Frame>,
    ) -> Result<LoopOutcome> {
        let mut iteration = 0;
        let mut state = LoopState::Streaming;

        loop {
            state = match state {
                LoopState::Streaming => {
                    if iteration >= self.config.max_iterations {
                        warn!("Iteration bound {} reached", self.config.max_iterations);
                        return Err(Error::IterationBoundExceeded(self.config.max_iterations));
                    }
                    iteration += 1;

                    let turn = self.stream_turn(context, iteration, tx).await?;
                    if turn.has_tool_calls() {
                        debug!(
                            "Iteration {}: {} tool call(s)",
                            iteration,
                            turn.tool_calls.len()
                        );
                        let assistant = Turn::assistant_with_calls(turn.text, turn.tool_calls.clone());
                        let message_id = self.persist(conversation_id, &assistant).await;
                        context.push(assistant);
                        LoopState::Dispatching {
                            calls: turn.tool_calls,
                            message_id,
                        }
                    } else {
                        let assistant = Turn::assistant(turn.text.clone());
                        self.persist(conversation_id, &assistant).await;
                        context.push(assistant);
                        LoopState::Done(turn.text)
                    }
                }
                LoopState::Dispatching { calls, message_id } => {
                    let mut remaining = calls.into_iter();
                    while let Some(call) = remaining.next() {
                        let result = self.dispatch(&call, message_id.clone(), tx).await;
                        self.append_result(conversation_id, context, result).await;

                        // Every call of the assistant turn gets a tool turn
                        if self.cancel.is_cancelled() {
                            for call in remaining {
                                let result = self.skip_cancelled(&call, message_id.clone()).await;
                                self.append_result(conversation_id, context, result).await;
                            }
                            return Err(Error::Cancelled);
                        }
                    }
                    LoopState::Streaming
                }
                LoopState::Done(final_text) => {
                    info!("Loop finished after {} model call(s)", iteration);
                    return Ok(LoopOutcome {
                        conversation_id: conversation_id.to_string(),
                        final_text,
                        iterations: iteration,
                    });
                }
            };
        }
    }

    /// One model call: open (with retries), forward text, accumulate calls
    async fn stream_turn(
        &self,
        context: &ConversationContext,
        iteration: usize,
        tx: &mpsc::Sender<Frame>,
    ) -> Result<AccumulatedTurn> {
        let request = ModelRequest {
            model: &self.config.model,
            turns: context.turns(),
            tools: &self.tools,
        };
        let log = |result: Option<&AccumulatedTurn>, error: Option<&str>| {
            log_model_interaction(LogConfig {
                model: &self.config.model,
                provider: Some(&self.config.provider),
                iteration,
                turns: context.turns(),
                tools: &self.tools,
                result,
                error,
            })
        };

        let mut stream = match self.open_with_retry(request).await {
            Ok(stream) => stream,
            Err(e) => {
                log(None, Some(&e.to_string()));
                return Err(e);
            }
        };

        let mut accumulator = StreamAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(delta)) => {
                    if let Some(text) = delta.text.as_deref().filter(|t| !t.is_empty()) {
                        self.emit(tx, Frame::text(text)).await;
                    }
                    accumulator.push(&delta);
                }
                Some(Err(e)) => {
                    log(None, Some(&e.to_string()));
                    return Err(e.into());
                }
                None => break,
            }
        }

        let turn = accumulator.finish();
        log(Some(&turn), None);
        Ok(turn)
    }

    async fn open_with_retry(&self, request: ModelRequest<'_>) -> Result<DeltaStream> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                opened = self.client.open_stream(request) => opened,
            };

            match opened {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Model call failed (attempt {}/{}): {}, retrying",
                        attempt, attempts, e
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = self.backoff.wait(attempt) => {}
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run one call and report it with a `tool_start`/`tool_end` pair
    async fn dispatch(
        &self,
        call: &ToolCall,
        message_id: Option<String>,
        tx: &mpsc::Sender<Frame>,
    ) -> ToolResult {
        self.emit(tx, Frame::tool_start(&call.name, &call.arguments)).await;

        let outcome = match call.parse_arguments() {
            Ok(args) => self.executor.execute(&call.name, args, message_id).await,
            Err(e) => {
                warn!("Tool call {} has malformed arguments: {}", call.id, e);
                self.executor
                    .record_failure(&call.name, Value::String(call.arguments.clone()), e, message_id)
                    .await
            }
        };

        let output = outcome.output_value();
        self.emit(tx, Frame::tool_end(&call.name, output.clone())).await;

        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: outcome.is_success(),
            output,
        }
    }

    /// Record a call that never started because the run was cancelled
    async fn skip_cancelled(&self, call: &ToolCall, message_id: Option<String>) -> ToolResult {
        let input = call
            .parse_arguments()
            .unwrap_or_else(|_| Value::String(call.arguments.clone()));
        let outcome = self
            .executor
            .record_failure(
                &call.name,
                input,
                ToolError::ExecutionFailure("Cancelled".to_string()),
                message_id,
            )
            .await;

        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: false,
            output: outcome.output_value(),
        }
    }

    async fn append_result(
        &self,
        conversation_id: &str,
        context: &mut ConversationContext,
        result: ToolResult,
    ) {
        let turn = Turn::tool_result(result);
        self.persist(conversation_id, &turn).await;
        context.push(turn);
    }

    async fn persist(&self, conversation_id: &str, turn: &Turn) -> Option<String> {
        match self.store.append_message(conversation_id, turn).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to persist {} message: {}", turn.role.as_str(), e);
                None
            }
        }
    }

    async fn emit(&self, tx: &mpsc::Sender<Frame>, frame: Frame) {
        if let Err(e) = tx.send(frame).await {
            debug!("Frame receiver dropped: {}", e);
        }
    }
}
