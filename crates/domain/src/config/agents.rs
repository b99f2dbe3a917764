use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent / subagent configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Top-level agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum provider/tool round-trips per `process` call before the
    /// loop is forced to return whatever text it has.
    #[serde(default = "d_main_max_iterations")]
    pub max_iterations: u32,
    /// Provider name this agent resolves by default.
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub subagent: SubagentConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_main_max_iterations(),
            provider_name: None,
            subagent: SubagentConfig::default(),
        }
    }
}

/// Limits applied to subagents spawned via the `spawn` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    #[serde(default = "d_subagent_max_iterations")]
    pub max_iterations: u32,
    /// Max messages retained in a subagent's context window.
    #[serde(default = "d_subagent_max_messages")]
    pub max_context_messages: usize,
    /// Tool name allowlist. Never includes `spawn`, `cron`, or `message`
    /// regardless of this list's contents.
    #[serde(default = "d_subagent_tools")]
    pub allowed_tools: Vec<String>,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_subagent_max_iterations(),
            max_context_messages: d_subagent_max_messages(),
            allowed_tools: d_subagent_tools(),
        }
    }
}

const RESERVED_FOR_MAIN_AGENT: &[&str] = &["spawn", "cron", "message"];

impl SubagentConfig {
    /// Effective tool allowlist with the main-agent-only tools removed,
    /// no matter what configuration asked for.
    pub fn effective_allowed_tools(&self) -> Vec<String> {
        self.allowed_tools
            .iter()
            .filter(|t| !RESERVED_FOR_MAIN_AGENT.contains(&t.as_str()))
            .cloned()
            .collect()
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_main_max_iterations() -> u32 {
    25
}
fn d_subagent_max_iterations() -> u32 {
    15
}
fn d_subagent_max_messages() -> usize {
    25
}
fn d_subagent_tools() -> Vec<String> {
    vec![
        "read_file".into(),
        "write_file".into(),
        "append_file".into(),
        "list_files".into(),
        "exec".into(),
        "process".into(),
        "web_fetch".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subagent_defaults_are_tighter_than_main() {
        let cfg = SubagentConfig::default();
        assert_eq!(cfg.max_iterations, 15);
        assert_eq!(cfg.max_context_messages, 25);
    }

    #[test]
    fn effective_allowed_tools_strips_reserved_even_if_configured() {
        let cfg = SubagentConfig {
            allowed_tools: vec!["exec".into(), "spawn".into(), "cron".into(), "message".into()],
            ..SubagentConfig::default()
        };
        assert_eq!(cfg.effective_allowed_tools(), vec!["exec".to_string()]);
    }
}
