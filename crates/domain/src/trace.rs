use serde::Serialize;

/// Structured trace events emitted across the orchestration core. Each
/// variant is logged as a single `tracing::info!` JSON blob rather than
/// an interpolated string, so downstream log processors can filter on
/// `event`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolExecuted {
        tool_name: String,
        duration_ms: f64,
        ok: bool,
    },
    SessionResolved {
        session_key: String,
        is_new: bool,
    },
    SessionReset {
        session_key: String,
        reason: String,
    },
    SubagentSpawned {
        subagent_id: String,
        origin_channel: String,
        origin_chat_id: String,
    },
    SubagentAnnounced {
        subagent_id: String,
        ok: bool,
    },
    JobFired {
        job_id: String,
        status: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
