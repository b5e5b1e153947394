//! Tool executor
//!
//! Runs one tool call through the gate: lookup, argument validation, the
//! tool's own security check, then execution under a wall-clock timeout.
//! Every call, including ones rejected before execution, leaves exactly one
//! execution record that ends in a terminal status.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::session::persistence::{ConversationStore, PendingExecution, ToolExecutionRecord};
use crate::tools::ToolRegistry;

/// Slack on top of the tool timeout before the executor gives up on a tool
/// that does not enforce its own limit
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Result of one dispatched call
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub tool_name: String,
    pub result: Result<Value, ToolError>,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// JSON fed back to the model and carried by the `tool_end` frame
    pub fn output_value(&self) -> Value {
        match &self.result {
            Ok(value) => value.clone(),
            Err(e) => json!({ "error": e.to_string(), "kind": e.kind() }),
        }
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort running tools when `cancel` fires. The call still gets a
    /// terminal record.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Validate, gate and run one call
    pub async fn execute(
        &self,
        tool_name: &str,
        args: Value,
        message_id: Option<String>,
    ) -> ExecutionOutcome {
        let pending = PendingExecution::new(message_id, tool_name, args.clone());
        self.persist_created(pending.record()).await;

        let start = Instant::now();
        let result = self.run(tool_name, args).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => info!("Tool {} succeeded in {:?}", tool_name, duration),
            Err(e) => info!("Tool {} failed in {:?}: {}", tool_name, duration, e),
        }

        let record = match &result {
            Ok(value) => pending.succeed(value.clone(), duration),
            Err(e) => pending.fail(e, duration),
        };
        self.persist_finished(&record).await;

        ExecutionOutcome {
            tool_name: tool_name.to_string(),
            result,
            duration,
        }
    }

    /// Record a call that failed before it could be dispatched, such as one
    /// whose arguments were not valid JSON
    pub async fn record_failure(
        &self,
        tool_name: &str,
        input: Value,
        error: ToolError,
        message_id: Option<String>,
    ) -> ExecutionOutcome {
        let pending = PendingExecution::new(message_id, tool_name, input);
        self.persist_created(pending.record()).await;
        let record = pending.fail(&error, Duration::ZERO);
        self.persist_finished(&record).await;

        ExecutionOutcome {
            tool_name: tool_name.to_string(),
            result: Err(error),
            duration: Duration::ZERO,
        }
    }

    async fn run(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        tool.definition().validate(&args)?;
        tool.check(&args)?;

        debug!("Executing tool {} with {}", tool_name, args);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(ToolError::ExecutionFailure("Cancelled".to_string()))
            }
            result = tokio::time::timeout(self.timeout + TIMEOUT_GRACE, tool.execute(args)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Tool {} exceeded {:?}", tool_name, self.timeout);
                        Err(ToolError::ExecutionTimeout(self.timeout))
                    }
                }
            }
        }
    }

    async fn persist_created(&self, record: &ToolExecutionRecord) {
        if let Err(e) = self.store.create_execution_record(record).await {
            warn!("Failed to create execution record {}: {}", record.id, e);
        }
    }

    async fn persist_finished(&self, record: &ToolExecutionRecord) {
        if let Err(e) = self.store.update_execution_record(record).await {
            warn!("Failed to update execution record {}: {}", record.id, e);
        }
    }
}
