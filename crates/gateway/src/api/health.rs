//! `GET /healthz` — public liveness probe, no auth.

use axum::response::{IntoResponse, Json};

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
