//! Admin bearer-token auth middleware.
//!
//! Reads the env var named by `config.admin.token_env` once at startup
//! (see [`crate::bootstrap::build_app_state`]) and caches its SHA-256
//! digest in [`AppState::admin_token_hash`]. If that's `None` — the env
//! var was unset or empty — auth is disabled and every request passes
//! (dev mode, same tradeoff the gateway's config validation already
//! warns about at startup).

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_admin_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let expected = match &state.admin_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected.as_slice())) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid or missing admin token" })),
        )
            .into_response();
    }

    next.run(req).await
}
