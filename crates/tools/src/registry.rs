//! Generic tool abstraction and registry.
//!
//! Tools describe themselves with a JSON-schema `parameters` block (fed to
//! the provider as the tool's function signature) and execute against a
//! [`ToolContext`] carrying the channel/chat/agent the call originated from.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;

/// Where a tool call came from — threaded through so tools like `message`
/// and `cron` can default to "reply here" without the caller repeating
/// channel/chat_id in every call.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub channel: Option<String>,
    pub chat_id: Option<String>,
    pub agent_name: String,
}

/// A single callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema for the tool's arguments object.
    fn parameters(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext, args: Value) -> String;

    /// OpenAI-style function definition, as handed to the provider and to
    /// the DSML prompt-injected tool list.
    fn to_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }
}

/// Registry of callable tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    pub fn unregister(&self, name: &str) {
        self.tools.write().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn get_definitions(&self) -> Vec<Value> {
        self.tools.read().values().map(|t| t.to_schema()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Execute a tool by name. Unknown tools and execution panics both
    /// surface as an `"Error: ..."` string rather than propagating —
    /// the reentrant tool loop feeds this straight back to the model as a
    /// tool result, so it must never be a hard failure.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> (String, f64) {
        let Some(tool) = self.get(name) else {
            return (format!("Error: Tool '{name}' not found"), 0.0);
        };

        let start = Instant::now();
        let result = std::panic::AssertUnwindSafe(tool.execute(ctx, args))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| format!("Error executing {name}: tool panicked"));
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        (result, duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
            args["text"].as_str().unwrap_or_default().to_string()
        }
    }

    #[tokio::test]
    async fn execute_unknown_tool_reports_not_found() {
        let reg = ToolRegistry::new();
        let (result, _) = reg.execute("ghost", Value::Null, &ToolContext::default()).await;
        assert_eq!(result, "Error: Tool 'ghost' not found");
    }

    #[tokio::test]
    async fn execute_known_tool_runs() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Echo));
        let (result, _) = reg
            .execute("echo", serde_json::json!({"text": "hi"}), &ToolContext::default())
            .await;
        assert_eq!(result, "hi");
    }

    #[test]
    fn definitions_include_registered_tools() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(Echo));
        let defs = reg.get_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["function"]["name"], "echo");
    }
}
