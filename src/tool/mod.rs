//! Tool system
//!
//! The capabilities exposed to the agentic investigator. Tools are pure
//! functions of their inputs plus the corpus store (plus the grounded search
//! provider for the case-law tools). They never fail the loop: schema
//! violations and missing records come back as structured `{error, ...}`
//! values the model can recover from.

pub mod case;
pub mod caselaw;
pub mod findings;
pub mod legal;

use crate::provider::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A tool the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool identifier advertised to the model.
    fn id(&self) -> &str;

    /// Description for the model.
    fn description(&self) -> &str;

    /// JSON Schema for the input object.
    fn input_schema(&self) -> Value;

    /// Execute with the model-supplied arguments.
    async fn execute(&self, args: Value) -> Result<ToolResult>;
}

/// Result from tool execution. `output` is always a JSON document.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub success: bool,
}

impl ToolResult {
    pub fn json(value: &Value) -> Self {
        Self {
            output: serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string()),
            success: true,
        }
    }

    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Self {
            output: json!({"error": kind, "message": message.into()}).to_string(),
            success: false,
        }
    }

    /// Schema-violation result carrying the deserializer's explanation.
    pub fn bad_input(details: impl Into<String>) -> Self {
        Self {
            output: json!({"error": "bad_input", "details": details.into()}).to_string(),
            success: false,
        }
    }
}

/// Parse model-supplied arguments against a tool's input type.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> std::result::Result<T, ToolResult> {
    serde_json::from_value(args).map_err(|e| ToolResult::bad_input(e.to_string()))
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let id = tool.id().to_string();
        if !self.tools.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.tools.insert(id, tool);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    /// Tool ids in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Definitions for the model, optionally restricted to a subset.
    pub fn definitions(&self, subset: Option<&[&str]>) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter(|id| subset.map(|s| s.contains(&id.as_str())).unwrap_or(true))
            .filter_map(|id| self.tools.get(id))
            .map(|t| ToolDefinition {
                name: t.id().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Dispatch one invocation. Never fails: unknown tools and execution
    /// errors come back as structured error results.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => match tool.execute(args).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(tool = name, error = %e, "tool execution failed");
                    ToolResult::error("tool_failed", e.to_string())
                }
            },
            None => ToolResult::error(
                "unknown_tool",
                format!("no tool named '{name}'; available: {}", self.order.join(", ")),
            ),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn id(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn execute(&self, args: Value) -> Result<ToolResult> {
            #[derive(serde::Deserialize)]
            struct Params {
                text: String,
            }
            let p: Params = match parse_args(args) {
                Ok(p) => p,
                Err(bad) => return Ok(bad),
            };
            Ok(ToolResult::json(&json!({"echo": p.text})))
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_structured_error() {
        let registry = ToolRegistry::new();
        let result = registry.dispatch("nope", json!({})).await;
        assert!(!result.success);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["error"], "unknown_tool");
    }

    #[tokio::test]
    async fn schema_violation_is_bad_input() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let result = registry.dispatch("echo", json!({"text": 42})).await;
        assert!(!result.success);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["error"], "bad_input");
    }

    #[tokio::test]
    async fn subset_definitions_preserve_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let defs = registry.definitions(Some(&["echo"]));
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert!(registry.definitions(Some(&["other"])).is_empty());
    }
}
