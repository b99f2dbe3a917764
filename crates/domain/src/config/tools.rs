use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools (exec / process)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the built-in exec/process tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub exec_security: ExecSecurityConfig,
    /// Max chars of a `web_fetch` response body kept before truncation.
    #[serde(default = "d_web_fetch_max_chars")]
    pub web_fetch_max_response_chars: usize,
    /// Workspace root that file tools are constrained to.
    #[serde(default = "d_workspace_root")]
    pub workspace_root: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec: ExecConfig::default(),
            exec_security: ExecSecurityConfig::default(),
            web_fetch_max_response_chars: d_web_fetch_max_chars(),
            workspace_root: d_workspace_root(),
        }
    }
}

fn d_web_fetch_max_chars() -> usize {
    20_000
}
fn d_workspace_root() -> String {
    "./data/workspace".into()
}

/// Exec tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Default yield time in ms before auto-backgrounding (0 = always foreground).
    #[serde(default = "d_10000")]
    pub background_ms: u64,
    /// Hard timeout for foreground commands (seconds).
    #[serde(default = "d_1800")]
    pub timeout_sec: u64,
    /// TTL for finished process sessions before cleanup (ms).
    #[serde(default = "d_1800000")]
    pub cleanup_ms: u64,
    /// Max output chars kept per process session.
    #[serde(default = "d_1000000")]
    pub max_output_chars: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            background_ms: 10_000,
            timeout_sec: 1800,
            cleanup_ms: 1_800_000,
            max_output_chars: 1_000_000,
        }
    }
}

/// Security configuration for the exec tool — audit logging and command denylist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSecurityConfig {
    /// Log every exec invocation at INFO level.
    #[serde(default = "d_true")]
    pub audit_log: bool,
    /// Regex patterns that are denied. Commands matching any pattern are rejected.
    #[serde(default = "d_denied_patterns")]
    pub denied_patterns: Vec<String>,
}

impl Default for ExecSecurityConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            denied_patterns: d_denied_patterns(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_10000() -> u64 {
    10_000
}
fn d_1800() -> u64 {
    1800
}
fn d_1800000() -> u64 {
    1_800_000
}
fn d_1000000() -> usize {
    1_000_000
}
fn d_true() -> bool {
    true
}
fn d_denied_patterns() -> Vec<String> {
    vec![
        r"rm\s+-rf\s+/".into(),
        r"mkfs\.".into(),
        r"dd\s+if=.+of=/dev/".into(),
    ]
}
