//! Web search tool
//!
//! No search backend is wired in yet; results are placeholders so the
//! model can still exercise the tool-call path.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{ParamType, Tool, ToolDefinition};

pub struct WebSearch {
    def: ToolDefinition,
}

impl WebSearch {
    pub fn new() -> Self {
        Self {
            def: ToolDefinition::new("web_search", "Search the web for information.")
                .param("query", ParamType::String, "Search query"),
        }
    }
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let query = args["query"].as_str().unwrap_or_default();
        Ok(json!({
            "query": query,
            "mock": true,
            "results": [{
                "title": format!("Result for {}", query),
                "url": "https://example.com",
                "snippet": "This is a mock search result snippet.",
            }],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_results() {
        let out = WebSearch::new()
            .execute(json!({"query": "rust async"}))
            .await
            .unwrap();
        assert_eq!(out["mock"], true);
        assert_eq!(out["results"][0]["title"], "Result for rust async");
    }
}
