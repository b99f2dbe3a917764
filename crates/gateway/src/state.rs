//! Shared application state.
//!
//! `AppState` itself holds nothing actor-shaped: actors (the agent, the
//! scheduler, each channel) register into the [`ActorRegistry`] and are
//! resolved by name from there. What lives here directly are the passive,
//! freely-clonable dependencies every actor needs a handle to.

use std::path::PathBuf;
use std::sync::Arc;

use sa_domain::config::Config;
use sa_providers::ProviderRegistry;
use sa_registry::ActorRegistry;
use sa_scheduler::Scheduler;
use sa_sessions::SessionStore;
use sa_tools::ToolRegistry;

use crate::runtime::session_lock::SessionLockMap;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ActorRegistry>,
    pub providers: Arc<ProviderRegistry>,
    pub sessions: Arc<SessionStore>,
    pub tools: Arc<ToolRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub session_locks: Arc<SessionLockMap>,
    pub workspace_root: PathBuf,
    /// SHA-256 digest of the admin bearer token, never the raw value.
    pub admin_token_hash: Option<Vec<u8>>,
}
