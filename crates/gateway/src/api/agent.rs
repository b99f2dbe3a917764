//! `POST /v1/turn` — run one turn through the agent handle, the
//! HTTP-facing equivalent of what a channel adapter calls in-process.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use sa_registry::{AgentHandle, TurnMessage};
use sa_scheduler::AGENT_ACTOR_NAME;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub channel: String,
    #[serde(default = "default_sender")]
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
}

fn default_sender() -> String {
    "api".to_string()
}

#[derive(Serialize)]
struct TurnResponse {
    response: String,
}

pub async fn turn(State(state): State<AppState>, Json(body): Json<TurnRequest>) -> Response {
    let agent = match state.registry.resolve_trait::<dyn AgentHandle>(AGENT_ACTOR_NAME) {
        Ok(a) => a,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": format!("agent not available: {e}") })),
            )
                .into_response();
        }
    };

    let mut msg = TurnMessage::new(body.channel, body.sender_id, body.chat_id, body.content);
    msg.media = body.media;

    let response = agent.process(msg).await;
    Json(TurnResponse { response }).into_response()
}
