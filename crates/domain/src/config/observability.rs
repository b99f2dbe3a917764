use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability (tracing) configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Controls the `tracing`/`tracing-subscriber` setup done once at
/// startup (`init_tracing()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive string, e.g. "info" or "sa_gateway=debug,info".
    /// Overridden by the `RUST_LOG` env var when set.
    #[serde(default = "d_log_level")]
    pub log_level: String,

    /// Emit structured JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: d_log_level(),
            json: false,
        }
    }
}

fn d_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_level_is_info() {
        assert_eq!(ObservabilityConfig::default().log_level, "info");
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.json);
    }

    #[test]
    fn deserialize_with_overrides() {
        let toml_str = r#"
            log_level = "debug"
            json = true
        "#;
        let cfg: ObservabilityConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.json);
    }
}
