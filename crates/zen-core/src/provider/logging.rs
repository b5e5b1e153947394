//! Model request/response logging
//!
//! Set the `ZEN_LLM_LOG_FILE` environment variable to append one JSON line
//! per model call (request context, accumulated result or error) to a file.
//!
//! Example: `ZEN_LLM_LOG_FILE=/tmp/llm.log zen chat -m "list files"`

use serde_json::json;
use std::io::Write;
use tracing::{debug, warn};

use crate::session::{AccumulatedTurn, Turn};
use crate::tools::ToolDefinition;

pub const LOG_FILE_ENV: &str = "ZEN_LLM_LOG_FILE";

/// What to include in the log entry
#[derive(Default)]
pub struct LogConfig<'a> {
    pub model: &'a str,
    pub provider: Option<&'a str>,
    pub iteration: usize,
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDefinition],
    pub result: Option<&'a AccumulatedTurn>,
    pub error: Option<&'a str>,
}

fn entry(config: &LogConfig<'_>) -> serde_json::Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "model": config.model,
        "provider": config.provider,
        "iteration": config.iteration,
        "request": {
            "messages": config.turns.iter().map(|t| json!({
                "role": t.role.as_str(),
                "content": t.content,
                "tool_calls": t.tool_calls().len(),
            })).collect::<Vec<_>>(),
            "message_count": config.turns.len(),
            "tools": config.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        },
        "response": config.result.map(|r| json!({
            "type": if r.has_tool_calls() { "tool_calls" } else { "message" },
            "content": r.text,
            "tool_calls": r.tool_calls.iter().map(|c| json!({
                "name": c.name,
                "call_id": c.id,
                "arguments": c.arguments,
            })).collect::<Vec<_>>(),
        })),
        "error": config.error,
    })
}

/// Log a model interaction to file if `ZEN_LLM_LOG_FILE` is set
pub fn log_model_interaction(config: LogConfig<'_>) {
    let log_file = match std::env::var(LOG_FILE_ENV) {
        Ok(path) if !path.is_empty() => path,
        _ => return,
    };

    let line = entry(&config).to_string();
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", line) {
                warn!("Failed to write to LLM log file: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to open LLM log file {}: {}", log_file, e);
        }
    }

    debug!("Logged model interaction to {}", log_file);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;

    #[test]
    fn test_entry_shape() {
        let turns = vec![Turn::user("list files")];
        let result = AccumulatedTurn {
            text: "Sure".into(),
            tool_calls: vec![ToolCall {
                id: "c1".into(),
                name: "execute_shell".into(),
                arguments: "{\"command\":\"ls\"}".into(),
            }],
        };
        let value = entry(&LogConfig {
            model: "big-pickle",
            iteration: 1,
            turns: &turns,
            result: Some(&result),
            ..Default::default()
        });

        assert_eq!(value["model"], "big-pickle");
        assert_eq!(value["request"]["message_count"], 1);
        assert_eq!(value["response"]["type"], "tool_calls");
        assert_eq!(value["response"]["tool_calls"][0]["name"], "execute_shell");
        assert!(value["error"].is_null());
    }
}
