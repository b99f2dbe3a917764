use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider configuration
//
// One concrete provider kind is carried as a worked example: an
// OpenAI-compatible HTTP endpoint. Multi-provider routing,
// pricing, and classifier-based tiering are not part of the core.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_20000u")]
    pub default_timeout_ms: u64,
    /// Registered providers. The first entry is the default.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Model used when a caller does not specify one.
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (config-only setups; prefer `env`).
    #[serde(default)]
    pub key: Option<String>,
    /// Multiple env var names for round-robin key rotation. When
    /// non-empty, takes precedence over `env`/`key`.
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    QueryParam,
    None,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_20000u() -> u64 {
    20_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_providers() {
        assert!(LlmConfig::default().providers.is_empty());
    }

    #[test]
    fn provider_config_deserializes() {
        let json = r#"{
            "id": "openai",
            "base_url": "https://api.openai.com/v1",
            "auth": {"mode": "api_key", "env": "OPENAI_API_KEY"},
            "default_model": "gpt-4o-mini"
        }"#;
        let cfg: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.id, "openai");
        assert_eq!(cfg.kind, ProviderKind::OpenaiCompat);
        assert_eq!(cfg.default_model.as_deref(), Some("gpt-4o-mini"));
    }
}
