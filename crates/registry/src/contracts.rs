//! Shared seams resolved by name through the registry.
//!
//! `scheduler` and `tools::spawn`/`tools::cron`/`tools::message` never
//! depend on the concrete agent/channel implementations in `gateway` —
//! they only depend on these trait objects, resolved at call time via
//! [`crate::registry::ActorRegistry::resolve_trait`]. This is the Rust
//! expression of "actors never hold direct references to peers — they
//! re-resolve by name".

use async_trait::async_trait;

use sa_domain::stream::{AgentChunk, BoxStream};

/// Wire-level turn input.
#[derive(Debug, Clone)]
pub struct TurnMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    pub media: Vec<String>,
}

impl TurnMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
        }
    }
}

/// The agent's external interface.
#[async_trait]
pub trait AgentHandle: Send + Sync + 'static {
    async fn process(&self, msg: TurnMessage) -> String;

    /// Streaming variant of `process`: yields `ToolCall`
    /// and `ToolResult` chunks as the loop executes tools, `Token` chunks
    /// carrying the final answer, then one terminal `Done`.
    async fn process_stream(&self, msg: TurnMessage) -> BoxStream<'static, AgentChunk>;

    async fn announce(&self, origin_channel: String, origin_chat_id: String, content: String) -> String;
}

/// A channel's external interface.
#[async_trait]
pub trait ChannelHandle: Send + Sync + 'static {
    async fn send_text(&self, chat_id: String, content: String);
}
