//! The CLI channel adapter — the one worked channel
//! implementation. Reads lines from stdin on a dedicated blocking thread
//! (rustyline needs synchronous terminal I/O) and feeds each as a turn to
//! the agent resolved by name; the turn's reply and anything delivered
//! through `send_text` both print to stdout.
//!
//! The core never imports this module directly — it's registered under
//! `channel.cli` at bootstrap and reached only through [`ChannelHandle`].

use std::sync::Arc;

use async_trait::async_trait;
use rustyline::DefaultEditor;

use sa_domain::config::ChannelConfig;
use sa_domain::error::Result;
use sa_registry::{Actor, ActorRegistry, AgentHandle, ChannelHandle, TurnMessage};
use sa_scheduler::AGENT_ACTOR_NAME;

pub const CHANNEL_NAME: &str = "cli";
const LOCAL_SENDER_ID: &str = "local";
const LOCAL_CHAT_ID: &str = "local";

pub struct CliChannel {
    registry: Arc<ActorRegistry>,
    config: ChannelConfig,
}

impl CliChannel {
    pub fn new(registry: Arc<ActorRegistry>, config: ChannelConfig) -> Arc<Self> {
        Arc::new(Self { registry, config })
    }
}

#[async_trait]
impl ChannelHandle for CliChannel {
    async fn send_text(&self, _chat_id: String, content: String) {
        println!("{content}");
    }
}

#[async_trait]
impl Actor for CliChannel {
    /// Inbound path: authenticate via `allow_from`, then call
    /// `agent.process` and print the reply through `send_text`'s own path.
    async fn run(self: Arc<Self>) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !self.config.allows(LOCAL_SENDER_ID) {
            tracing::warn!("cli channel: local sender not in allow_from, channel will not accept input");
            return Ok(());
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        tokio::task::spawn_blocking(move || {
            let mut editor = match DefaultEditor::new() {
                Ok(e) => e,
                Err(e) => {
                    tracing::error!(error = %e, "cli channel: failed to start line editor");
                    return;
                }
            };
            loop {
                match editor.readline("> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        let _ = editor.add_history_entry(line.as_str());
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        while let Some(line) = rx.recv().await {
            let registry = self.registry.clone();
            tokio::spawn(async move {
                let agent = match registry.resolve_trait::<dyn AgentHandle>(AGENT_ACTOR_NAME) {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::error!(error = %e, "cli channel: could not resolve agent");
                        return;
                    }
                };
                let msg = TurnMessage::new(
                    CHANNEL_NAME.to_string(),
                    LOCAL_SENDER_ID.to_string(),
                    LOCAL_CHAT_ID.to_string(),
                    line,
                );
                let reply = agent.process(msg).await;
                println!("{reply}");
            });
        }

        Ok(())
    }
}
