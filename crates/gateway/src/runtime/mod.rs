//! The agent runtime: the turn loop, subagent lifecycle, and the mechanical
//! helpers (compaction, truncation, DSML fallback parsing) it leans on.

pub mod agent;
pub mod compact;
pub mod dsml;
pub mod session_lock;
pub mod subagent;
