//! `/v1/scheduler/jobs*` — the scheduler handle:
//! `add_job`, `remove_job`, `enable_job`, `list_jobs`, `run_job`, `status`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use sa_scheduler::job::{Job, JobState, Payload, Schedule};

use crate::state::AppState;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddJobRequest {
    pub name: String,
    pub schedule: Schedule,
    pub message: String,
    #[serde(default)]
    pub deliver: bool,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub delete_after_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    #[serde(default)]
    pub include_disabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableJobRequest {
    pub enabled: bool,
}

pub async fn list_jobs(State(state): State<AppState>, Query(query): Query<ListJobsQuery>) -> Response {
    let jobs: Vec<Job> = state
        .scheduler
        .list_jobs()
        .into_iter()
        .filter(|j| query.include_disabled || j.enabled)
        .collect();
    Json(serde_json::json!({ "jobs": jobs })).into_response()
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.get_job(&id) {
        Some(job) => Json(job).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("job not found: {id}")),
    }
}

/// `GET /v1/scheduler/status` — the aggregate `{enabled, jobs_count,
/// next_wake_at_ms}` report (spec §4.5/§6), not a per-job lookup.
pub async fn status(State(state): State<AppState>) -> Response {
    Json(state.scheduler.status()).into_response()
}

pub async fn add_job(State(state): State<AppState>, Json(body): Json<AddJobRequest>) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    let job = Job {
        id,
        name: body.name,
        enabled: true,
        schedule: body.schedule,
        payload: Payload {
            kind: "agent_turn".to_string(),
            message: body.message,
            deliver: body.deliver,
            channel: body.channel,
            to: body.to,
        },
        state: JobState::default(),
        created_at_ms: now_ms(),
        updated_at_ms: now_ms(),
        delete_after_run: body.delete_after_run,
    };

    match state.scheduler.add_job(job) {
        Ok(job) => Json(job).into_response(),
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

pub async fn remove_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.remove_job(&id) {
        Ok(()) => Json(serde_json::json!({ "removed": true })).into_response(),
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

pub async fn enable_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EnableJobRequest>,
) -> Response {
    match state.scheduler.enable_job(&id, body.enabled) {
        Ok(job) => Json(job).into_response(),
        Err(e) => api_error(StatusCode::NOT_FOUND, e.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJobQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn run_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RunJobQuery>,
) -> Response {
    match state.scheduler.run_job(&id, query.force).await {
        Ok(ran) => Json(serde_json::json!({ "ran": ran })).into_response(),
        Err(e) => api_error(StatusCode::NOT_FOUND, e.to_string()),
    }
}
