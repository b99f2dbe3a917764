//! Wires every subsystem into an [`AppState`] and starts the actor
//! topology: the agent, the subagent manager, the scheduler,
//! and every enabled channel adapter, each registered by name in a single
//! shared [`ActorRegistry`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use sa_domain::config::{Config, ConfigSeverity};
use sa_providers::ProviderRegistry;
use sa_registry::{ActorRegistry, AgentHandle, ChannelHandle, RestartPolicy};
use sa_scheduler::{CronStore, Scheduler, AGENT_ACTOR_NAME};
use sa_sessions::SessionStore;
use sa_tools::builtin::{
    AppendFileTool, DeleteFileTool, ExecTool, ListFilesTool, MoveFileTool, ProcessTool,
    ReadFileTool, WebFetchTool, WriteFileTool,
};
use sa_tools::cron_tool::CronTool;
use sa_tools::message_tool::MessageTool;
use sa_tools::spawn::{SpawnTool, SubagentSpawner, SUBAGENTS_ACTOR_NAME};
use sa_tools::{ProcessManager, ToolRegistry};

use crate::channels::cli::{CliChannel, CHANNEL_NAME as CLI_CHANNEL_NAME};
use crate::runtime::agent::Agent;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::subagent::SubagentManager;
use crate::state::AppState;

/// Validate config, construct every subsystem, start the actor topology,
/// and return the shared [`AppState`] the HTTP surface serves from.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let registry = ActorRegistry::new();

    let providers = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?,
    );
    if providers.is_empty() {
        tracing::warn!("no LLM providers initialized — turns will fail until one is configured");
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }

    let sessions = Arc::new(SessionStore::with_lifecycle(
        &config.sessions.state_dir,
        config.sessions.lifecycle.clone(),
    ));
    tracing::info!(state_dir = %config.sessions.state_dir, "session store ready");

    let session_locks = Arc::new(SessionLockMap::new());

    let workspace_root = PathBuf::from(&config.tools.workspace_root);
    std::fs::create_dir_all(&workspace_root)
        .with_context(|| format!("creating workspace root {}", workspace_root.display()))?;

    let process_manager = Arc::new(ProcessManager::new(config.tools.exec.clone()));

    let denied_commands = Arc::new(
        regex::RegexSet::new(&config.tools.exec_security.denied_patterns)
            .context("invalid regex in tools.exec_security.denied_patterns")?,
    );
    tracing::info!(
        patterns = config.tools.exec_security.denied_patterns.len(),
        "exec denied-patterns compiled"
    );

    let cron_store = CronStore::load(&config.scheduler.store_path)
        .context("loading cron store")?;
    let scheduler = Scheduler::new(cron_store, registry.clone());

    let tools = build_main_tool_registry(
        &config,
        &registry,
        &scheduler,
        &process_manager,
        &workspace_root,
        &denied_commands,
    );

    let agent = Agent::new(
        config.clone(),
        registry.clone(),
        providers.clone(),
        sessions.clone(),
        tools.clone(),
        session_locks.clone(),
        workspace_root.clone(),
    );
    registry
        .spawn(AGENT_ACTOR_NAME, RestartPolicy::never(), agent.clone())
        .await
        .map_err(|e| anyhow::anyhow!("spawning agent actor: {e}"))?;
    registry.register_trait_object::<dyn AgentHandle>(AGENT_ACTOR_NAME, agent.clone());

    let subagents = SubagentManager::new(
        config.clone(),
        registry.clone(),
        providers.clone(),
        process_manager.clone(),
        workspace_root.clone(),
        denied_commands.clone(),
    );
    registry
        .spawn(SUBAGENTS_ACTOR_NAME, RestartPolicy::never(), subagents.clone())
        .await
        .map_err(|e| anyhow::anyhow!("spawning subagent manager: {e}"))?;
    registry.register_trait_object::<dyn SubagentSpawner>(SUBAGENTS_ACTOR_NAME, subagents.clone());

    registry
        .spawn("scheduler", RestartPolicy::never(), scheduler.clone())
        .await
        .map_err(|e| anyhow::anyhow!("spawning scheduler actor: {e}"))?;
    scheduler.arm_all();

    spawn_channels(&config, &registry).await?;

    spawn_maintenance_task(process_manager.clone(), session_locks.clone());

    let admin_token_hash = std::env::var(&config.admin.token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| hash_token(&t));
    if admin_token_hash.is_none() {
        tracing::warn!(
            env_var = %config.admin.token_env,
            "admin bearer-token auth DISABLED — set the env var to enable"
        );
    }

    Ok(AppState {
        config,
        registry,
        providers,
        sessions,
        tools,
        scheduler,
        session_locks,
        workspace_root,
        admin_token_hash,
    })
}

fn build_main_tool_registry(
    config: &Config,
    registry: &Arc<ActorRegistry>,
    scheduler: &Arc<Scheduler>,
    process_manager: &Arc<ProcessManager>,
    workspace_root: &std::path::Path,
    denied_commands: &Arc<regex::RegexSet>,
) -> Arc<ToolRegistry> {
    let tools = ToolRegistry::new();
    let root = workspace_root.to_path_buf();

    tools.register(Arc::new(ReadFileTool { workspace_root: root.clone() }));
    tools.register(Arc::new(WriteFileTool { workspace_root: root.clone() }));
    tools.register(Arc::new(AppendFileTool { workspace_root: root.clone() }));
    tools.register(Arc::new(MoveFileTool { workspace_root: root.clone() }));
    tools.register(Arc::new(DeleteFileTool { workspace_root: root.clone() }));
    tools.register(Arc::new(ListFilesTool { workspace_root: root }));
    tools.register(Arc::new(ExecTool {
        manager: process_manager.clone(),
        denied_commands: denied_commands.clone(),
        audit_log: config.tools.exec_security.audit_log,
    }));
    tools.register(Arc::new(ProcessTool { manager: process_manager.clone() }));
    tools.register(Arc::new(WebFetchTool::new(config.tools.web_fetch_max_response_chars)));

    tools.register(Arc::new(SpawnTool { registry: registry.clone() }));
    tools.register(Arc::new(CronTool { scheduler: scheduler.clone() }));
    tools.register(Arc::new(MessageTool { registry: registry.clone() }));

    Arc::new(tools)
}

/// Start every enabled channel named in config. `cli` is the one worked
/// adapter; any other configured channel name is accepted
/// (the core discovers channels only by `channel.<name>` resolution) but
/// has no concrete implementation in this crate, so it's logged and
/// skipped rather than failing startup.
async fn spawn_channels(config: &Arc<Config>, registry: &Arc<ActorRegistry>) -> anyhow::Result<()> {
    if let Some(cli_config) = config.channels.channels.get(CLI_CHANNEL_NAME).cloned() {
        if cli_config.enabled {
            let channel = CliChannel::new(registry.clone(), cli_config);
            registry
                .spawn(
                    format!("channel.{CLI_CHANNEL_NAME}"),
                    RestartPolicy::channel_default(),
                    channel.clone(),
                )
                .await
                .map_err(|e| anyhow::anyhow!("spawning cli channel actor: {e}"))?;
            registry.register_trait_object::<dyn ChannelHandle>(
                format!("channel.{CLI_CHANNEL_NAME}"),
                channel,
            );
        }
    } else {
        let channel = CliChannel::new(registry.clone(), Default::default());
        registry
            .spawn(
                format!("channel.{CLI_CHANNEL_NAME}"),
                RestartPolicy::channel_default(),
                channel.clone(),
            )
            .await
            .map_err(|e| anyhow::anyhow!("spawning cli channel actor: {e}"))?;
        registry.register_trait_object::<dyn ChannelHandle>(format!("channel.{CLI_CHANNEL_NAME}"), channel);
    }

    for (name, cfg) in config.channels.channels.iter() {
        if name != CLI_CHANNEL_NAME && cfg.enabled {
            tracing::warn!(channel = %name, "channel configured but no adapter implementation is registered for it");
        }
    }

    Ok(())
}

/// Sweep stale finished process sessions and idle session locks once a
/// minute so both maps don't grow unbounded over a long-running process.
fn spawn_maintenance_task(process_manager: Arc<ProcessManager>, session_locks: Arc<SessionLockMap>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            process_manager.cleanup_stale();
            session_locks.prune_idle();
        }
    });
}

/// Recompute the admin token hash once at startup; kept here so
/// `api::auth` only ever compares digests, never the raw token.
pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}
