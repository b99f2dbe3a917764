//! The `spawn` tool.
//!
//! Decoupled from the concrete subagent manager the same way everything
//! else in this workspace is decoupled from concrete peers: via a trait
//! registered in the [`sa_registry::ActorRegistry`] under a well-known
//! name, resolved at call time. `gateway::runtime::subagent::SubagentManager`
//! is the implementation; this crate only knows the trait.

use async_trait::async_trait;
use serde_json::{json, Value};

use sa_registry::ActorRegistry;
use std::sync::Arc;

use crate::registry::{Tool, ToolContext};

/// Name the concrete subagent manager registers itself under.
pub const SUBAGENTS_ACTOR_NAME: &str = "subagents";

/// The seam `spawn` dispatches through — never `spawn` or `cron` or
/// `message` themselves.
#[async_trait]
pub trait SubagentSpawner: Send + Sync + 'static {
    /// Kick off a subagent task. Returns immediately with the subagent's
    /// id — the subagent announces its result back asynchronously.
    async fn spawn(
        &self,
        task: String,
        label: Option<String>,
        origin_channel: String,
        origin_chat_id: String,
    ) -> String;
}

pub struct SpawnTool {
    pub registry: Arc<ActorRegistry>,
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }
    fn description(&self) -> &str {
        "Spawn a background subagent to work on a focused task independently \
         and report back when done. Use for multi-step work that would \
         otherwise block this conversation."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "The task for the subagent to complete."},
                "label": {"type": "string", "description": "A short human-readable label for the task."}
            },
            "required": ["task"]
        })
    }
    async fn execute(&self, ctx: &ToolContext, args: Value) -> String {
        let Some(task) = args.get("task").and_then(Value::as_str) else {
            return "Error: 'task' argument is required".to_string();
        };
        let label = args.get("label").and_then(Value::as_str).map(str::to_string);

        let spawner = match self
            .registry
            .resolve_trait::<dyn SubagentSpawner>(SUBAGENTS_ACTOR_NAME)
        {
            Ok(s) => s,
            Err(e) => return format!("Error: {e}"),
        };

        let origin_channel = ctx.channel.clone().unwrap_or_else(|| "cli".to_string());
        let origin_chat_id = ctx.chat_id.clone().unwrap_or_default();

        let id = spawner
            .spawn(task.to_string(), label, origin_channel, origin_chat_id)
            .await;
        format!("Subagent {id} started; it will report back when finished.")
    }
}
