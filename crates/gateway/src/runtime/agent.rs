//! The main `Agent` actor.
//!
//! Implements [`AgentHandle`] so channels, the scheduler, and subagents can
//! all reach it the same way: resolved by name through the
//! [`ActorRegistry`], never held as a direct reference. `process` runs one
//! user turn to completion through the reentrant tool-calling loop in
//! [`run_tool_loop_stream`]; `announce` runs a synthetic turn for a subagent's
//! result and pushes it out through `channel.<origin_channel>`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use sa_domain::config::Config;
use sa_domain::error::Result;
use sa_domain::stream::{AgentChunk, BoxStream, StreamEvent};
use sa_domain::tool::{ContentPart, Message, MessageContent, Role};
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatRequest, ProviderRegistry};
use sa_registry::{ActorRegistry, Actor, AgentHandle, ChannelHandle, TurnMessage};
use sa_sessions::{session_key, SessionStore};
use sa_tools::{Tool, ToolContext, ToolRegistry};

use futures_util::StreamExt;

use super::compact;
use super::dsml;
use super::session_lock::SessionLockMap;

const EMPTY_RESPONSE_RETRIES: u32 = 1;
const NO_RESPONSE_SENTINEL: &str = "I've completed processing but have no response to give.";

/// Parameters that differ between the main agent's loop and a subagent's
/// loop.
pub struct LoopLimits {
    pub max_iterations: u32,
    pub max_context_messages: usize,
    pub max_tool_result_chars: usize,
    pub empty_response_retries: u32,
    pub jittered_backoff: bool,
}

impl LoopLimits {
    pub fn main(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            max_context_messages: compact::MAIN_MAX_CONTEXT_MESSAGES,
            max_tool_result_chars: compact::MAIN_MAX_TOOL_RESULT_CHARS,
            empty_response_retries: EMPTY_RESPONSE_RETRIES,
            jittered_backoff: false,
        }
    }

    pub fn subagent(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            max_context_messages: compact::SUBAGENT_MAX_CONTEXT_MESSAGES,
            max_tool_result_chars: compact::SUBAGENT_MAX_TOOL_RESULT_CHARS,
            empty_response_retries: EMPTY_RESPONSE_RETRIES,
            jittered_backoff: true,
        }
    }
}

pub struct Agent {
    config: Arc<Config>,
    registry: Arc<ActorRegistry>,
    providers: Arc<ProviderRegistry>,
    sessions: Arc<SessionStore>,
    tools: Arc<ToolRegistry>,
    session_locks: Arc<SessionLockMap>,
    workspace_root: PathBuf,
}

impl Agent {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ActorRegistry>,
        providers: Arc<ProviderRegistry>,
        sessions: Arc<SessionStore>,
        tools: Arc<ToolRegistry>,
        session_locks: Arc<SessionLockMap>,
        workspace_root: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            providers,
            sessions,
            tools,
            session_locks,
            workspace_root,
        })
    }

    /// Assemble the system prompt: identity, workspace notes, a memory
    /// block, and a tool index.
    fn build_system_prompt(&self) -> String {
        let mut sections = Vec::new();
        sections.push(
            "You are an assistant that can read and write files, \
             run shell commands, fetch web pages, schedule future work, and \
             spawn focused subagents for multi-step tasks."
                .to_string(),
        );
        sections.push(format!(
            "Workspace root: {}. All file tools are constrained to this directory.",
            self.workspace_root.display()
        ));
        sections.push(
            "Memory: you have no long-term memory beyond this conversation's \
             session history; treat each session as the full record of what \
             you know about it."
                .to_string(),
        );
        let tool_names = self.tools.tool_names();
        if !tool_names.is_empty() {
            let mut names = tool_names;
            names.sort();
            sections.push(format!("Available tools: {}.", names.join(", ")));
        }
        sections.join("\n\n")
    }

    fn resolve_provider(&self) -> std::result::Result<Arc<dyn sa_providers::LlmProvider>, String> {
        let name = self.config.agent.provider_name.as_deref();
        let provider = match name {
            Some(n) => self.providers.get(n),
            None => self.providers.default_provider(),
        };
        provider.ok_or_else(|| "Error calling LLM: no provider configured".to_string())
    }

    /// Build and run a turn's stream. The
    /// per-chat lock is acquired here and held by the returned stream
    /// until it yields `Done`, covering "the entire turn including
    /// session save".
    async fn run_turn_stream(&self, msg: TurnMessage) -> BoxStream<'static, AgentChunk> {
        let key = session_key(&msg.channel, &msg.chat_id);
        let permit = self
            .session_locks
            .acquire(&key)
            .await
            .expect("session lock semaphore is never closed");

        let is_new = !self.sessions.exists(&key);
        TraceEvent::SessionResolved {
            session_key: key.clone(),
            is_new,
        }
        .emit();

        let history = self.sessions.messages(&key).unwrap_or_default();

        let provider = match self.resolve_provider() {
            Ok(p) => p,
            Err(e) => {
                drop(permit);
                return Box::pin(async_stream::stream! {
                    yield AgentChunk::Token { text: e };
                    yield AgentChunk::Done;
                });
            }
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.build_system_prompt()));
        messages.extend(history);
        messages.push(user_message(&msg));

        let tool_ctx = ToolContext {
            channel: Some(msg.channel.clone()),
            chat_id: Some(msg.chat_id.clone()),
            agent_name: "agent".to_string(),
        };

        let limits = LoopLimits::main(self.config.agent.max_iterations);
        let inner = run_tool_loop_stream(provider, self.tools.clone(), tool_ctx, messages, compact::compact_main, limits);

        let sessions = self.sessions.clone();
        let original_content = msg.content;

        Box::pin(async_stream::stream! {
            let mut inner = inner;
            let mut buf = String::new();
            let mut saw_token = false;

            while let Some(chunk) = inner.next().await {
                if let AgentChunk::Token { text } = &chunk {
                    saw_token = true;
                    buf.push_str(text);
                }
                if matches!(chunk, AgentChunk::Done) {
                    // Session save happens before the terminal chunk is
                    // handed out, so a caller that stops polling right
                    // after `Done` (never driving the generator to
                    // completion) still gets a persisted turn.
                    let final_text = if saw_token { buf.clone() } else { NO_RESPONSE_SENTINEL.to_string() };
                    if let Err(e) = sessions.append(
                        &key,
                        &[Message::user(original_content.clone()), Message::assistant(final_text)],
                    ) {
                        tracing::warn!(session_key = %key, error = %e, "failed to persist session turn");
                    }
                    drop(permit);
                    yield chunk;
                    return;
                }
                yield chunk;
            }
        })
    }

    async fn run_turn(&self, msg: TurnMessage) -> String {
        let mut stream = self.run_turn_stream(msg).await;
        let mut buf = String::new();
        let mut saw_token = false;
        while let Some(chunk) = stream.next().await {
            if let AgentChunk::Token { text } = &chunk {
                saw_token = true;
                buf.push_str(text);
            }
            if matches!(chunk, AgentChunk::Done) {
                break;
            }
        }
        if saw_token {
            buf
        } else {
            NO_RESPONSE_SENTINEL.to_string()
        }
    }
}

fn user_message(msg: &TurnMessage) -> Message {
    if msg.media.is_empty() {
        return Message::user(msg.content.clone());
    }
    let mut parts = vec![ContentPart::Text {
        text: msg.content.clone(),
    }];
    for url in &msg.media {
        parts.push(ContentPart::Image {
            url: url.clone(),
            media_type: None,
        });
    }
    Message {
        role: Role::User,
        content: MessageContent::Parts(parts),
    }
}

#[async_trait]
impl AgentHandle for Agent {
    async fn process(&self, msg: TurnMessage) -> String {
        self.run_turn(msg).await
    }

    async fn process_stream(&self, msg: TurnMessage) -> BoxStream<'static, AgentChunk> {
        self.run_turn_stream(msg).await
    }

    /// A subagent's result, delivered as a synthetic turn.
    async fn announce(&self, origin_channel: String, origin_chat_id: String, content: String) -> String {
        let msg = TurnMessage::new(origin_channel.clone(), "subagent", origin_chat_id.clone(), content);
        let response = self.run_turn(msg).await;

        if let Ok(channel) = self.registry.resolve_trait::<dyn ChannelHandle>(&origin_channel) {
            channel.send_text(origin_chat_id, response.clone()).await;
        }
        response
    }
}

#[async_trait]
impl Actor for Agent {}

/// The reentrant tool-calling loop shared by the main agent and every
/// subagent. `compactor` and the limits in `cfg` are
/// what distinguish the two call sites. Yields `ToolCall`/`ToolResult` as
/// tools run, `Token` chunks carrying the final answer, then one terminal
/// `Done` — never returns a bare `String` itself; callers that just want
/// the final text use [`drain_to_string`].
pub fn run_tool_loop_stream(
    provider: Arc<dyn sa_providers::LlmProvider>,
    tools: Arc<ToolRegistry>,
    tool_ctx: ToolContext,
    mut messages: Vec<Message>,
    compactor: fn(&[Message], usize) -> Vec<Message>,
    cfg: LoopLimits,
) -> BoxStream<'static, AgentChunk> {
    Box::pin(async_stream::stream! {
        let mut had_tool_calls = false;
        let mut empty_responses = 0u32;

        for iteration in 0..cfg.max_iterations {
            messages = compactor(&messages, cfg.max_context_messages);

            if had_tool_calls && iteration > 0 {
                let stream_req = ChatRequest {
                    messages: messages.clone(),
                    tools: Vec::new(),
                    ..Default::default()
                };
                let started = std::time::Instant::now();
                if let Ok(mut stream) = provider.chat_stream(&stream_req).await {
                    let mut buf = String::new();
                    let mut any_delta = false;
                    while let Some(event) = stream.next().await {
                        match event {
                            Ok(StreamEvent::Token { text }) => {
                                if !text.is_empty() {
                                    any_delta = true;
                                    buf.push_str(&text);
                                    yield AgentChunk::Token { text };
                                }
                            }
                            Ok(StreamEvent::Done { .. }) => break,
                            Ok(_) => {}
                            Err(_) => break,
                        }
                    }
                    if any_delta {
                        TraceEvent::LlmRequest {
                            provider: provider.provider_id().to_string(),
                            model: provider.get_default_model().to_string(),
                            streaming: true,
                            duration_ms: started.elapsed().as_millis() as u64,
                            prompt_tokens: None,
                            completion_tokens: None,
                        }
                        .emit();
                        yield AgentChunk::Done;
                        return;
                    }
                }
            }

            let req = ChatRequest {
                messages: messages.clone(),
                tools: tools.get_definitions_as_tool_definitions(),
                ..Default::default()
            };
            let started = std::time::Instant::now();
            let resp = match provider.chat(&req).await {
                Ok(r) => r,
                Err(e) => {
                    yield AgentChunk::Token { text: format!("Error calling LLM: {e}") };
                    yield AgentChunk::Done;
                    return;
                }
            };
            TraceEvent::LlmRequest {
                provider: provider.provider_id().to_string(),
                model: resp.model.clone(),
                streaming: false,
                duration_ms: started.elapsed().as_millis() as u64,
                prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
                completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
            }
            .emit();

            let mut tool_calls = resp.tool_calls;
            let content = resp.content;

            if tool_calls.is_empty() {
                let dsml_calls = dsml::parse_dsml_tool_calls(&content);
                if !dsml_calls.is_empty() {
                    tool_calls = dsml_calls;
                } else if content.trim().is_empty() {
                    empty_responses += 1;
                    if empty_responses > cfg.empty_response_retries {
                        break;
                    }
                    if cfg.jittered_backoff {
                        tokio::time::sleep(jittered_backoff(empty_responses)).await;
                    }
                    continue;
                } else {
                    yield AgentChunk::Token { text: content };
                    yield AgentChunk::Done;
                    return;
                }
            }

            had_tool_calls = true;
            messages.push(assistant_tool_call_message(&content, &tool_calls));

            for tc in &tool_calls {
                yield AgentChunk::ToolCall { tool_name: tc.tool_name.clone() };
                let (result, duration_ms) = tools.execute(&tc.tool_name, tc.arguments.clone(), &tool_ctx).await;
                let ok = !result.starts_with("Error");
                TraceEvent::ToolExecuted {
                    tool_name: tc.tool_name.clone(),
                    duration_ms,
                    ok,
                }
                .emit();
                let preview: String = result.chars().take(200).collect();
                yield AgentChunk::ToolResult { tool_name: tc.tool_name.clone(), preview };
                let truncated = compact::truncate_tool_result(&result, cfg.max_tool_result_chars);
                messages.push(Message::tool_result(&tc.call_id, &truncated));
            }
        }

        yield AgentChunk::Token { text: NO_RESPONSE_SENTINEL.to_string() };
        yield AgentChunk::Done;
    })
}

/// Drains a chunk stream, concatenating `Token` text, for call sites that
/// only want the final answer (e.g. a subagent's own result string).
pub async fn drain_to_string(mut stream: BoxStream<'static, AgentChunk>) -> String {
    let mut buf = String::new();
    let mut saw_token = false;
    while let Some(chunk) = stream.next().await {
        if let AgentChunk::Token { text } = &chunk {
            saw_token = true;
            buf.push_str(text);
        }
        if matches!(chunk, AgentChunk::Done) {
            break;
        }
    }
    if saw_token {
        buf
    } else {
        NO_RESPONSE_SENTINEL.to_string()
    }
}

fn assistant_tool_call_message(content: &str, tool_calls: &[sa_domain::tool::ToolCall]) -> Message {
    let mut parts = Vec::new();
    if !content.is_empty() {
        parts.push(ContentPart::Text {
            text: content.to_string(),
        });
    }
    for tc in tool_calls {
        parts.push(ContentPart::ToolUse {
            id: tc.call_id.clone(),
            name: tc.tool_name.clone(),
            input: tc.arguments.clone(),
        });
    }
    Message {
        role: Role::Assistant,
        content: MessageContent::Parts(parts),
    }
}

/// Exponential-ish jittered backoff for subagent empty-response retries,
/// capped at 10s. No external randomness source is wired
/// into this crate, so jitter is derived from the clock's sub-second
/// component rather than a dedicated RNG.
fn jittered_backoff(attempt: u32) -> std::time::Duration {
    let base_ms = 500u64.saturating_mul(1u64 << attempt.min(4));
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let jitter_ms = (nanos % 250) as u64;
    std::time::Duration::from_millis((base_ms + jitter_ms).min(10_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_backoff_is_capped_at_ten_seconds() {
        for attempt in 0..8 {
            let d = jittered_backoff(attempt);
            assert!(d <= std::time::Duration::from_secs(10));
        }
    }

    #[test]
    fn assistant_tool_call_message_carries_both_text_and_tool_use() {
        let tc = sa_domain::tool::ToolCall {
            call_id: "c1".into(),
            tool_name: "exec".into(),
            arguments: serde_json::json!({"command": "ls"}),
        };
        let msg = assistant_tool_call_message("thinking...", std::slice::from_ref(&tc));
        match msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], ContentPart::Text { .. }));
                assert!(matches!(parts[1], ContentPart::ToolUse { .. }));
            }
            _ => panic!("expected Parts content"),
        }
    }

    #[test]
    fn assistant_tool_call_message_with_empty_content_skips_text_part() {
        let tc = sa_domain::tool::ToolCall {
            call_id: "c1".into(),
            tool_name: "exec".into(),
            arguments: serde_json::json!({}),
        };
        let msg = assistant_tool_call_message("", std::slice::from_ref(&tc));
        match msg.content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 1),
            _ => panic!("expected Parts content"),
        }
    }
}

/// Extension used only by the loop: builds provider [`ToolDefinition`]s
/// from the registry's JSON schemas without leaking the OpenAI-shaped
/// `to_schema()` wrapper into the provider boundary.
trait ToolDefinitionsExt {
    fn get_definitions_as_tool_definitions(&self) -> Vec<sa_domain::tool::ToolDefinition>;
}

impl ToolDefinitionsExt for ToolRegistry {
    fn get_definitions_as_tool_definitions(&self) -> Vec<sa_domain::tool::ToolDefinition> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| self.get(&name))
            .map(|tool| sa_domain::tool::ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }
}
