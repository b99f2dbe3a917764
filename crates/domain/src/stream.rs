use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (provider-agnostic).
///
/// Allows: dashboard live output, Discord/Telegram typing indicators,
/// partial responses, tool call assembly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A tool call has started.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    /// Incremental tool call argument data.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// A tool call is complete with full arguments.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A chunk of the agent's `process_stream` output → iter<AgentChunk>`").
///
/// Unlike [`StreamEvent`] (provider-level token deltas and tool-call
/// assembly), this is the tool-loop's own externally-visible event shape:
/// one `ToolCall`/`ToolResult` pair per tool executed this turn, zero or
/// more `Token`s carrying the final answer (possibly many, if the answer
/// came from the streaming fallback after a tool-calling iteration), and
/// exactly one terminal `Done`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum AgentChunk {
    /// A piece of the final answer's text.
    #[serde(rename = "token")]
    Token { text: String },
    /// A tool is about to run.
    #[serde(rename = "tool_call")]
    ToolCall { tool_name: String },
    /// A tool finished; `preview` is the result's first 200 characters,
    /// not the (possibly truncated) text injected into the session log.
    #[serde(rename = "tool_result")]
    ToolResult { tool_name: String, preview: String },
    /// The turn is finished; no further chunks follow.
    #[serde(rename = "done")]
    Done,
}
