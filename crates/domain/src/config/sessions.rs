use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session storage and lifecycle configuration.
///
/// The session key is always `"<channel>:<chat_id>"` —
/// there is no routing/scoping layer here, unlike a multi-tenant inbox
/// product that needs to collapse DMs across accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory append-ordered session record files are written under.
    #[serde(default = "d_state_dir")]
    pub state_dir: String,

    /// Session lifecycle rules (resets, idle timeouts).
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

/// Session lifecycle rules: when a session gets rotated to a fresh
/// transcript on its next touch, rather than growing forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Daily reset hour (0–23, UTC). `None` disables daily reset.
    #[serde(default)]
    pub daily_reset_hour: Option<u8>,

    /// Idle timeout in minutes. If the last turn was more than this many
    /// minutes ago, the session is rotated on the next touch.
    #[serde(default)]
    pub idle_minutes: Option<u32>,

    /// Per-channel overrides (keys: `"discord"`, `"telegram"`, …).
    #[serde(default)]
    pub reset_by_channel: HashMap<String, ResetOverride>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            daily_reset_hour: Some(4),
            idle_minutes: None,
            reset_by_channel: HashMap::new(),
        }
    }
}

impl LifecycleConfig {
    /// No daily reset, no idle timeout, no per-channel overrides.
    pub fn disabled() -> Self {
        Self {
            daily_reset_hour: None,
            idle_minutes: None,
            reset_by_channel: HashMap::new(),
        }
    }

    /// Resolve the effective rule for `channel`, letting a per-channel
    /// override win field-by-field over the global defaults.
    pub fn resolve(&self, channel: &str) -> ResolvedLifecycleRule {
        let over = self.reset_by_channel.get(channel);
        ResolvedLifecycleRule {
            daily_reset_hour: over.and_then(|o| o.daily_reset_hour).or(self.daily_reset_hour),
            idle_minutes: over.and_then(|o| o.idle_minutes).or(self.idle_minutes),
        }
    }
}

/// Per-channel override of the lifecycle defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetOverride {
    pub daily_reset_hour: Option<u8>,
    pub idle_minutes: Option<u32>,
}

/// A [`LifecycleConfig`] resolved for one channel: global defaults with any
/// per-channel override applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLifecycleRule {
    daily_reset_hour: Option<u8>,
    idle_minutes: Option<u32>,
}

impl ResolvedLifecycleRule {
    /// Whether either rotation rule is configured at all.
    pub fn is_active(&self) -> bool {
        self.daily_reset_hour.is_some() || self.idle_minutes.is_some()
    }

    /// Whether a session last touched at `last_touch_ms` is due for
    /// rotation as of `now_ms`.
    pub fn is_due(&self, last_touch_ms: i64, now_ms: i64) -> bool {
        if let Some(idle_minutes) = self.idle_minutes {
            if now_ms.saturating_sub(last_touch_ms) > i64::from(idle_minutes) * 60_000 {
                return true;
            }
        }
        if let Some(hour) = self.daily_reset_hour {
            if let Some(boundary_ms) = last_daily_boundary_ms(now_ms, hour) {
                if last_touch_ms < boundary_ms {
                    return true;
                }
            }
        }
        false
    }
}

/// The most recent UTC timestamp (in ms) at which the clock crossed
/// `hour:00:00`, at or before `now_ms`.
fn last_daily_boundary_ms(now_ms: i64, hour: u8) -> Option<i64> {
    use chrono::{Duration, TimeZone, Utc};
    let now = Utc.timestamp_millis_opt(now_ms).single()?;
    let today = now.date_naive().and_hms_opt(u32::from(hour), 0, 0)?.and_utc();
    let boundary = if now >= today { today } else { today - Duration::days(1) };
    Some(boundary.timestamp_millis())
}

fn d_state_dir() -> String {
    "./data/sessions".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_global_defaults() {
        let cfg = LifecycleConfig {
            daily_reset_hour: Some(4),
            idle_minutes: Some(120),
            reset_by_channel: HashMap::new(),
        };
        let rule = cfg.resolve("discord");
        assert_eq!(rule.daily_reset_hour, Some(4));
        assert_eq!(rule.idle_minutes, Some(120));
    }

    #[test]
    fn resolve_per_channel_override_wins_field_by_field() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "discord".to_string(),
            ResetOverride { daily_reset_hour: None, idle_minutes: Some(30) },
        );
        let cfg = LifecycleConfig {
            daily_reset_hour: Some(4),
            idle_minutes: Some(120),
            reset_by_channel: overrides,
        };
        let rule = cfg.resolve("discord");
        assert_eq!(rule.daily_reset_hour, Some(4));
        assert_eq!(rule.idle_minutes, Some(30));

        let unaffected = cfg.resolve("telegram");
        assert_eq!(unaffected.idle_minutes, Some(120));
    }

    #[test]
    fn disabled_rule_is_never_due() {
        let rule = LifecycleConfig::disabled().resolve("cli");
        assert!(!rule.is_active());
        assert!(!rule.is_due(0, i64::MAX));
    }

    #[test]
    fn idle_timeout_triggers_after_the_configured_minutes() {
        let cfg = LifecycleConfig { daily_reset_hour: None, idle_minutes: Some(30), reset_by_channel: HashMap::new() };
        let rule = cfg.resolve("cli");
        let last_touch = 1_000_000_000_000;
        assert!(!rule.is_due(last_touch, last_touch + 29 * 60_000));
        assert!(rule.is_due(last_touch, last_touch + 31 * 60_000));
    }

    #[test]
    fn daily_boundary_triggers_once_crossed() {
        use chrono::{TimeZone, Utc};
        let cfg = LifecycleConfig { daily_reset_hour: Some(4), idle_minutes: None, reset_by_channel: HashMap::new() };
        let rule = cfg.resolve("cli");

        let last_touch = Utc.with_ymd_and_hms(2026, 7, 28, 23, 0, 0).unwrap().timestamp_millis();
        let before_boundary = Utc.with_ymd_and_hms(2026, 7, 29, 3, 59, 0).unwrap().timestamp_millis();
        let after_boundary = Utc.with_ymd_and_hms(2026, 7, 29, 4, 1, 0).unwrap().timestamp_millis();

        assert!(!rule.is_due(last_touch, before_boundary));
        assert!(rule.is_due(last_touch, after_boundary));
    }
}
