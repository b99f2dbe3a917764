use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-channel configuration, keyed by channel name (`"cli"`, `"discord"`, …).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(flatten)]
    pub channels: HashMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Whether this channel actor is started at bootstrap.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Sender ids allowed to reach `agent.process` through this channel.
    /// Empty means "allow all" — only appropriate for local/dev channels.
    #[serde(default)]
    pub allow_from: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_from: Vec::new(),
        }
    }
}

fn d_true() -> bool {
    true
}

impl ChannelConfig {
    pub fn allows(&self, sender_id: &str) -> bool {
        self.allow_from.is_empty() || self.allow_from.iter().any(|s| s == sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_from_allows_everyone() {
        let cfg = ChannelConfig::default();
        assert!(cfg.allows("anyone"));
    }

    #[test]
    fn non_empty_allow_from_restricts() {
        let cfg = ChannelConfig {
            allow_from: vec!["alice".into()],
            ..ChannelConfig::default()
        };
        assert!(cfg.allows("alice"));
        assert!(!cfg.allows("bob"));
    }
}
