//! Built-in tools for the agent orchestration core.
//!
//! `registry` holds the generic [`Tool`] trait and [`ToolRegistry`]; the
//! other modules are concrete tools registered into it. `exec`/`process`/
//! `manager` implement the foreground/background shell exec pair;
//! `file_ops` implements the workspace-constrained filesystem tools;
//! `builtin` wraps both as [`Tool`] impls; `spawn`/`cron_tool`/
//! `message_tool` are the peer-addressing tools that dispatch through the
//! actor registry rather than holding concrete peer references.

pub mod builtin;
pub mod cron_tool;
pub mod exec;
pub mod file_ops;
pub mod manager;
pub mod message_tool;
pub mod process;
pub mod registry;
pub mod spawn;

pub use manager::ProcessManager;
pub use registry::{Tool, ToolContext, ToolRegistry};
pub use spawn::{SubagentSpawner, SUBAGENTS_ACTOR_NAME};
