//! Cron job data model.
//!
//! Field names are snake_case in Rust and camelCase on disk; `serde`'s
//! `rename_all = "camelCase"` does that round-trip declaratively.

use serde::{Deserialize, Serialize};

/// When a job runs next.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Schedule {
    /// Fire once at an absolute unix-ms timestamp.
    At { at_ms: i64 },
    /// Fire every `every_ms` milliseconds, forever.
    Every { every_ms: i64 },
    /// Fire on the next tick of a 5-field crontab expression.
    Cron { expr: String },
}

/// What firing the job does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Always `"agent_turn"` — kept as an explicit field (rather than a unit
    /// variant) so the on-disk shape leaves room for future payload kinds
    /// without a store migration.
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub deliver: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl Payload {
    pub fn agent_turn(message: impl Into<String>) -> Self {
        Self {
            kind: "agent_turn".to_string(),
            message: message.into(),
            deliver: false,
            channel: None,
            to: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    #[serde(default = "d_true")]
    pub enabled: bool,
    pub schedule: Schedule,
    pub payload: Payload,
    #[serde(default)]
    pub state: JobState,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default)]
    pub delete_after_run: bool,
}

fn d_true() -> bool {
    true
}

/// `compute_next_run(schedule, base_ms)`.
///
/// - `at(t)` → `t` iff `t > base_ms`, else `None`. Idempotent under
///   re-computation at the same `base_ms`.
/// - `every(d)` → `base_ms + d` iff `d > 0`, else `None`.
/// - `cron(expr)` → the next tick of `expr` strictly after `base_ms`.
pub fn compute_next_run(schedule: &Schedule, base_ms: i64) -> Option<i64> {
    match schedule {
        Schedule::At { at_ms } => (*at_ms > base_ms).then_some(*at_ms),
        Schedule::Every { every_ms } => (*every_ms > 0).then_some(base_ms + every_ms),
        Schedule::Cron { expr } => {
            use chrono::{TimeZone, Utc};
            let after = Utc.timestamp_millis_opt(base_ms).single()?;
            crate::cron::cron_next(expr, &after).map(|dt| dt.timestamp_millis())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_schedule_future_vs_past() {
        assert_eq!(compute_next_run(&Schedule::At { at_ms: 200 }, 100), Some(200));
        assert_eq!(compute_next_run(&Schedule::At { at_ms: 100 }, 100), None);
        assert_eq!(compute_next_run(&Schedule::At { at_ms: 50 }, 100), None);
    }

    #[test]
    fn at_schedule_idempotent_at_same_base() {
        let s = Schedule::At { at_ms: 500 };
        let a = compute_next_run(&s, 100);
        let b = compute_next_run(&s, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn every_schedule_adds_delta() {
        assert_eq!(
            compute_next_run(&Schedule::Every { every_ms: 1000 }, 100),
            Some(1100)
        );
        assert_eq!(compute_next_run(&Schedule::Every { every_ms: 0 }, 100), None);
        assert_eq!(compute_next_run(&Schedule::Every { every_ms: -5 }, 100), None);
    }

    #[test]
    fn job_round_trips_camel_case_json() {
        let job = Job {
            id: "a1b2c3d4".into(),
            name: "ping".into(),
            enabled: true,
            schedule: Schedule::Every { every_ms: 60_000 },
            payload: Payload::agent_turn("ping"),
            state: JobState {
                next_run_at_ms: Some(123),
                ..Default::default()
            },
            created_at_ms: 1,
            updated_at_ms: 1,
            delete_after_run: false,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["nextRunAtMs"].is_null(), false);
        assert_eq!(json["createdAtMs"], 1);
        assert!(json.get("created_at_ms").is_none());

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }
}
