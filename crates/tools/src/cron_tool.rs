//! The `cron` tool — lets the LLM manage the scheduler's job store.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use sa_scheduler::{Job, JobState, Payload, Schedule, Scheduler};

use crate::registry::{Tool, ToolContext};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct CronTool {
    pub scheduler: Arc<Scheduler>,
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }
    fn description(&self) -> &str {
        "Manage scheduled jobs: add, remove, enable/disable, list, or run \
         immediately. Each job re-enters the agent's turn loop when it fires."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["add", "remove", "enable", "disable", "list", "run", "status"]},
                "id": {"type": "string"},
                "name": {"type": "string"},
                "message": {"type": "string"},
                "at_ms": {"type": "integer"},
                "every_ms": {"type": "integer"},
                "cron_expr": {"type": "string"},
                "deliver": {"type": "boolean"},
                "channel": {"type": "string"},
                "to": {"type": "string"},
                "delete_after_run": {"type": "boolean"},
                "force": {
                    "type": "boolean",
                    "description": "For 'run': bypass the job's enabled gate and execute it anyway."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> String {
        let action = args.get("action").and_then(Value::as_str).unwrap_or("list");
        match action {
            "add" => self.add(ctx, &args),
            "remove" => self.remove(&args),
            "enable" => self.set_enabled(&args, true),
            "disable" => self.set_enabled(&args, false),
            "list" => self.list(),
            "run" => self.run(&args).await,
            "status" => self.status(),
            other => format!("Error: unknown cron action '{other}'"),
        }
    }
}

impl CronTool {
    fn add(&self, ctx: &ToolContext, args: &Value) -> String {
        let Some(message) = args.get("message").and_then(Value::as_str) else {
            return "Error: 'message' is required to add a job".to_string();
        };
        let schedule = if let Some(at_ms) = args.get("at_ms").and_then(Value::as_i64) {
            Schedule::At { at_ms }
        } else if let Some(every_ms) = args.get("every_ms").and_then(Value::as_i64) {
            Schedule::Every { every_ms }
        } else if let Some(expr) = args.get("cron_expr").and_then(Value::as_str) {
            Schedule::Cron { expr: expr.to_string() }
        } else {
            return "Error: one of 'at_ms', 'every_ms', or 'cron_expr' is required".to_string();
        };

        let deliver = args.get("deliver").and_then(Value::as_bool).unwrap_or(false);
        let channel = args
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| ctx.channel.clone());
        let to = args
            .get("to")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| ctx.chat_id.clone());

        let job = Job {
            id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            name: args
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("untitled")
                .to_string(),
            enabled: true,
            schedule,
            payload: Payload {
                kind: "agent_turn".to_string(),
                message: message.to_string(),
                deliver,
                channel,
                to,
            },
            state: JobState::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: args
                .get("delete_after_run")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };

        match self.scheduler.add_job(job) {
            Ok(job) => serde_json::to_string(&job).unwrap_or_else(|_| "ok".into()),
            Err(e) => format!("Error: {e}"),
        }
    }

    fn remove(&self, args: &Value) -> String {
        let Some(id) = args.get("id").and_then(Value::as_str) else {
            return "Error: 'id' is required".to_string();
        };
        match self.scheduler.remove_job(id) {
            Ok(()) => format!("Removed job {id}"),
            Err(e) => format!("Error: {e}"),
        }
    }

    fn set_enabled(&self, args: &Value, enabled: bool) -> String {
        let Some(id) = args.get("id").and_then(Value::as_str) else {
            return "Error: 'id' is required".to_string();
        };
        match self.scheduler.enable_job(id, enabled) {
            Ok(job) => serde_json::to_string(&job).unwrap_or_else(|_| "ok".into()),
            Err(e) => format!("Error: {e}"),
        }
    }

    fn list(&self) -> String {
        serde_json::to_string(&self.scheduler.list_jobs()).unwrap_or_else(|_| "[]".into())
    }

    fn status(&self) -> String {
        serde_json::to_string(&self.scheduler.status()).unwrap_or_else(|_| "{}".into())
    }

    async fn run(&self, args: &Value) -> String {
        let Some(id) = args.get("id").and_then(Value::as_str) else {
            return "Error: 'id' is required".to_string();
        };
        let force = args.get("force").and_then(Value::as_bool).unwrap_or(false);
        match self.scheduler.run_job(id, force).await {
            Ok(true) => format!("Ran job {id}"),
            Ok(false) => format!("Job {id} is disabled; not run (pass force=true to override)"),
            Err(e) => format!("Error: {e}"),
        }
    }
}
