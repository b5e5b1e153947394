//! Tool system for the Zen agent
//!
//! Tools are the actions the model can take. Each tool has:
//! - A name and description for the LLM
//! - A typed parameter schema, used both for export and for validation
//! - An optional policy check that runs before execution
//! - An execute method

pub mod code;
pub mod filesystem;
pub mod shell;
pub mod web;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

/// JSON type a parameter must have at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// One entry of a tool's parameter map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Tool definition for LLM consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a required parameter
    pub fn param(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.push_param(name, kind, description, true)
    }

    /// Add an optional parameter
    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.push_param(name, kind, description, false)
    }

    fn push_param(mut self, name: &str, kind: ParamType, description: &str, required: bool) -> Self {
        self.parameters.push(ParamSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
        });
        self
    }

    /// JSON schema of the parameters object
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                json!({ "type": p.kind.as_str(), "description": p.description }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// `{name, description, parameters}` as exported to the model
    pub fn schema(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_schema(),
        })
    }

    /// Check required presence and runtime types, collecting every violation
    pub fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let Some(obj) = args.as_object() else {
            return Err(ToolError::InvalidArguments(vec![format!(
                "arguments must be a JSON object, got {}",
                json_type_name(args)
            )]));
        };

        let mut violations = Vec::new();
        for p in &self.parameters {
            match obj.get(&p.name) {
                None | Some(Value::Null) if p.required => {
                    violations.push(format!("missing required parameter '{}'", p.name));
                }
                Some(value) if !value.is_null() && !p.kind.matches(value) => {
                    violations.push(format!(
                        "parameter '{}' must be {} {}, got {}",
                        p.name,
                        article(p.kind.as_str()),
                        p.kind.as_str(),
                        json_type_name(value)
                    ));
                }
                _ => {}
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(violations))
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn article(word: &str) -> &'static str {
    if word.starts_with(['a', 'e', 'i', 'o', 'u']) {
        "an"
    } else {
        "a"
    }
}

/// Core trait for all tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameters
    fn definition(&self) -> &ToolDefinition;

    /// Tool name (used by LLM to invoke)
    fn name(&self) -> &str {
        &self.definition().name
    }

    /// Security policy for this tool. Runs after argument validation and
    /// before `execute`; an error here means `execute` is never called.
    fn check(&self, _args: &Value) -> Result<(), ToolError> {
        Ok(())
    }

    /// Execute the tool with validated parameters
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Registry of available tools, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second registration under the same name replaces
    /// the first but keeps its position.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| self.tools[slot].clone())
    }

    /// Get a tool's definition by name
    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&slot| self.tools[slot].definition())
    }

    /// List all definitions
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition().clone()).collect()
    }

    /// Exported schema for every tool
    pub fn schema(&self) -> Vec<Value> {
        self.tools.iter().map(|t| t.definition().schema()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
