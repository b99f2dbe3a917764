//! Session persistence for the agent orchestration core.
//!
//! A session is keyed by `"<channel>:<chat_id>"` ([`session_key`]) and holds
//! an append-ordered record of every message exchanged under that key.
//! Sessions are created on first touch and never destroyed implicitly; a
//! configured idle timeout or daily reset hour can rotate one to a fresh
//! transcript under the same key, but never deletes the old one. There is
//! no multi-tenant identity linking.

pub mod session_key;
pub mod store;

pub use session_key::{escape_key_for_filename, session_key};
pub use store::{Session, SessionStore};
