//! The `message` tool — lets the LLM send a point-to-point message to a
//! chat on any channel, resolved by name through the registry.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use sa_registry::{ActorRegistry, ChannelHandle};

use crate::registry::{Tool, ToolContext};

pub struct MessageTool {
    pub registry: Arc<ActorRegistry>,
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }
    fn description(&self) -> &str {
        "Send a message to a chat on a given channel, independent of the \
         current turn's reply. Use to proactively notify a user."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": {"type": "string"},
                "chat_id": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["channel", "chat_id", "content"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let (Some(channel), Some(chat_id), Some(content)) = (
            args.get("channel").and_then(Value::as_str),
            args.get("chat_id").and_then(Value::as_str),
            args.get("content").and_then(Value::as_str),
        ) else {
            return "Error: 'channel', 'chat_id', and 'content' are all required".to_string();
        };

        let name = format!("channel.{channel}");
        match self.registry.resolve_trait::<dyn ChannelHandle>(&name) {
            Ok(handle) => {
                handle.send_text(chat_id.to_string(), content.to_string()).await;
                format!("Message sent to {channel}:{chat_id}")
            }
            Err(e) => format!("Error: {e}"),
        }
    }
}
