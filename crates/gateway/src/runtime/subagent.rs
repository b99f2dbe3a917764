//! Subagent lifecycle.
//!
//! Registered under [`SUBAGENTS_ACTOR_NAME`] and resolved by the `spawn`
//! tool through [`SubagentSpawner`]. Each spawned task gets a fresh id, a
//! restricted tool registry, a focused system prompt, and runs the same
//! reentrant tool loop as the main agent under tighter limits — then
//! reports back to the main agent via `announce`.

use std::sync::Arc;

use async_trait::async_trait;

use sa_domain::config::Config;
use sa_domain::tool::Message;
use sa_domain::trace::TraceEvent;
use sa_providers::ProviderRegistry;
use sa_registry::{ActorRegistry, Actor, AgentHandle};
use sa_tools::{builtin::{AppendFileTool, DeleteFileTool, ExecTool, ListFilesTool, MoveFileTool, ProcessTool, ReadFileTool, WebFetchTool, WriteFileTool}, ProcessManager, Tool, ToolContext, ToolRegistry};

use super::agent::{drain_to_string, run_tool_loop_stream, LoopLimits};
use super::compact;

const AGENT_ACTOR_NAME: &str = "agent";

pub struct SubagentManager {
    config: Arc<Config>,
    registry: Arc<ActorRegistry>,
    providers: Arc<ProviderRegistry>,
    process_manager: Arc<ProcessManager>,
    workspace_root: std::path::PathBuf,
    denied_commands: Arc<regex::RegexSet>,
}

impl SubagentManager {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ActorRegistry>,
        providers: Arc<ProviderRegistry>,
        process_manager: Arc<ProcessManager>,
        workspace_root: std::path::PathBuf,
        denied_commands: Arc<regex::RegexSet>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            providers,
            process_manager,
            workspace_root,
            denied_commands,
        })
    }

    /// Restricted tool registry for a subagent: the effective allowlist
    /// from config, built from the same concrete tools the main agent
    /// uses.
    fn build_subagent_tools(&self) -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        let allowed = self.config.agent.subagent.effective_allowed_tools();
        let root = self.workspace_root.clone();

        let all: Vec<(&str, Arc<dyn Tool>)> = vec![
            ("read_file", Arc::new(ReadFileTool { workspace_root: root.clone() })),
            ("write_file", Arc::new(WriteFileTool { workspace_root: root.clone() })),
            ("append_file", Arc::new(AppendFileTool { workspace_root: root.clone() })),
            ("move_file", Arc::new(MoveFileTool { workspace_root: root.clone() })),
            ("delete_file", Arc::new(DeleteFileTool { workspace_root: root.clone() })),
            ("list_files", Arc::new(ListFilesTool { workspace_root: root.clone() })),
            (
                "exec",
                Arc::new(ExecTool {
                    manager: self.process_manager.clone(),
                    denied_commands: self.denied_commands.clone(),
                    audit_log: self.config.tools.exec_security.audit_log,
                }),
            ),
            ("process", Arc::new(ProcessTool { manager: self.process_manager.clone() })),
            (
                "web_fetch",
                Arc::new(WebFetchTool::new(self.config.tools.web_fetch_max_response_chars)),
            ),
        ];

        for (name, tool) in all {
            if allowed.iter().any(|a| a == name) {
                registry.register(tool);
            }
        }
        Arc::new(registry)
    }

    fn build_system_prompt(&self, task: &str, label: Option<&str>) -> String {
        let label = label.unwrap_or("subagent task");
        format!(
            "You are a focused subagent spawned to complete one task: \"{task}\" ({label}).\n\n\
             Stay focused; do not pursue side tasks outside this scope. \
             When you are done, your final response is the report back to the \
             agent that spawned you — it should clearly state what you did and \
             what the outcome was."
        )
    }
}

#[async_trait]
impl Actor for SubagentManager {}

#[async_trait]
impl sa_tools::SubagentSpawner for SubagentManager {
    async fn spawn(&self, task: String, label: Option<String>, origin_channel: String, origin_chat_id: String) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

        TraceEvent::SubagentSpawned {
            subagent_id: id.clone(),
            origin_channel: origin_channel.clone(),
            origin_chat_id: origin_chat_id.clone(),
        }
        .emit();

        let manager = SubagentRun {
            config: self.config.clone(),
            registry: self.registry.clone(),
            providers: self.providers.clone(),
            tools: self.build_subagent_tools(),
            system_prompt: self.build_system_prompt(&task, label.as_deref()),
        };

        let id_for_task = id.clone();
        tokio::spawn(async move {
            let (status, result) = manager.run(&task).await;
            let wrapped = wrap_announcement(label.as_deref(), &status, &task, &result);

            let ok = status == "completed successfully";
            let outcome = match manager.registry.resolve_trait::<dyn AgentHandle>(AGENT_ACTOR_NAME) {
                Ok(agent) => {
                    agent.announce(origin_channel, origin_chat_id, wrapped).await;
                    true
                }
                Err(e) => {
                    tracing::warn!(subagent_id = %id_for_task, error = %e, "could not resolve agent to announce subagent result");
                    false
                }
            };
            TraceEvent::SubagentAnnounced {
                subagent_id: id_for_task,
                ok: ok && outcome,
            }
            .emit();
        });

        id
    }
}

const MAX_ANNOUNCE_CHARS: usize = 3000;

fn wrap_announcement(label: Option<&str>, status: &str, task: &str, result: &str) -> String {
    let label = label.unwrap_or("subagent task");
    let capped = compact::truncate_tool_result(result, MAX_ANNOUNCE_CHARS);
    format!("Subagent report — \"{label}\" {status}.\n\nTask: {task}\n\nResult:\n{capped}")
}

struct SubagentRun {
    config: Arc<Config>,
    registry: Arc<ActorRegistry>,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
}

impl SubagentRun {
    async fn run(&self, task: &str) -> (String, String) {
        let provider = match self
            .config
            .agent
            .provider_name
            .as_deref()
            .and_then(|n| self.providers.get(n))
            .or_else(|| self.providers.default_provider())
        {
            Some(p) => p,
            None => return ("failed".to_string(), "Task failed due to an LLM error.".to_string()),
        };

        let messages = vec![Message::system(self.system_prompt.clone()), Message::user(task.to_string())];
        let tool_ctx = ToolContext {
            channel: None,
            chat_id: None,
            agent_name: "subagent".to_string(),
        };
        let limits = LoopLimits::subagent(self.config.agent.subagent.max_iterations);

        let stream = run_tool_loop_stream(
            provider,
            self.tools.clone(),
            tool_ctx,
            messages,
            compact::compact_subagent,
            limits,
        );
        let result = drain_to_string(stream).await;

        if result.starts_with("Error calling LLM:") {
            ("failed".to_string(), result)
        } else {
            ("completed successfully".to_string(), result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_announcement_includes_task_and_status() {
        let wrapped = wrap_announcement(Some("cleanup"), "completed successfully", "delete temp files", "done.");
        assert!(wrapped.contains("cleanup"));
        assert!(wrapped.contains("completed successfully"));
        assert!(wrapped.contains("delete temp files"));
        assert!(wrapped.contains("done."));
    }

    #[test]
    fn wrap_announcement_truncates_long_results() {
        let big = "x".repeat(10_000);
        let wrapped = wrap_announcement(None, "completed successfully", "task", &big);
        assert!(wrapped.chars().count() < big.chars().count() + 200);
    }
}
