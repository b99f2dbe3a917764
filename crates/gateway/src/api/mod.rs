//! The admin HTTP surface.
//!
//! Everything under `/v1/*` is gated behind [`auth::require_admin_token`];
//! only `/healthz` is public, for liveness probes.

pub mod agent;
pub mod auth;
pub mod health;
pub mod scheduler;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/healthz", get(health::healthz));

    let protected = Router::new()
        .route("/v1/turn", post(agent::turn))
        .route("/v1/scheduler/jobs", get(scheduler::list_jobs))
        .route("/v1/scheduler/jobs", post(scheduler::add_job))
        .route("/v1/scheduler/jobs/:id", get(scheduler::get_job))
        .route("/v1/scheduler/jobs/:id", delete(scheduler::remove_job))
        .route("/v1/scheduler/jobs/:id/enable", post(scheduler::enable_job))
        .route("/v1/scheduler/jobs/:id/run", post(scheduler::run_job))
        .route("/v1/scheduler/status", get(scheduler::status))
        .route_layer(middleware::from_fn_with_state(state, auth::require_admin_token));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
