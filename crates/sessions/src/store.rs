//! Session persistence.
//!
//! A session is the append-ordered record of every [`Message`] exchanged
//! under a session key. It is created on first touch and never destroyed
//! implicitly. The one exception is lifecycle rotation ([`LifecycleConfig`]):
//! once a session has gone idle past a configured timeout, or a configured
//! daily UTC boundary has been crossed since its last touch, the next touch
//! starts a fresh transcript under the same key rather than appending to the
//! old one. The old transcript file is archived alongside the new one, never
//! deleted.
//!
//! On disk, one file per session key lives under the configured state
//! directory, named by [`crate::session_key::escape_key_for_filename`]. The
//! file is a newline-delimited record stream: a single leading
//! [`SessionRecord::Meta`] record, followed by one [`SessionRecord::Msg`]
//! record per message, in order. Sessions are loaded from disk on first
//! access and cached in memory for the lifetime of the process.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sa_domain::config::LifecycleConfig;
use sa_domain::error::{Error, Result};
use sa_domain::tool::Message;

use crate::session_key::escape_key_for_filename;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// On-disk record shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SessionRecord {
    Meta { session_key: String, created_at_ms: i64 },
    Msg(Message),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A loaded session: its key, creation time, and full message history.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_key: String,
    pub created_at_ms: i64,
    pub messages: Vec<Message>,
}

struct SessionSlot {
    session: Session,
    path: PathBuf,
    last_touch_ms: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Loads and persists sessions under a state directory, one file per
/// session key, caching loaded sessions in memory.
pub struct SessionStore {
    state_dir: PathBuf,
    lifecycle: LifecycleConfig,
    cache: RwLock<HashMap<String, Arc<RwLock<SessionSlot>>>>,
}

impl SessionStore {
    /// A store with no lifecycle rotation configured — sessions only ever
    /// grow. Most callers that care about rotation should use
    /// [`SessionStore::with_lifecycle`] instead.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self::with_lifecycle(state_dir, LifecycleConfig::disabled())
    }

    pub fn with_lifecycle(state_dir: impl Into<PathBuf>, lifecycle: LifecycleConfig) -> Self {
        Self {
            state_dir: state_dir.into(),
            lifecycle,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        self.state_dir.join(format!("{}.jsonl", escape_key_for_filename(session_key)))
    }

    fn archived_path_for(&self, session_key: &str, at_ms: i64) -> PathBuf {
        self.state_dir.join(format!(
            "{}.{}.archived.jsonl",
            escape_key_for_filename(session_key),
            at_ms
        ))
    }

    /// Return the cache slot for `session_key`, loading it from disk (or
    /// creating a fresh one) on first access. Safe under concurrent
    /// callers: only one loser of the race actually reads the file.
    fn slot(&self, session_key: &str) -> Result<Arc<RwLock<SessionSlot>>> {
        if let Some(slot) = self.cache.read().get(session_key) {
            return Ok(slot.clone());
        }

        let mut cache = self.cache.write();
        if let Some(slot) = cache.get(session_key) {
            return Ok(slot.clone());
        }

        let path = self.path_for(session_key);
        let (session, last_touch_ms) = load_from_disk(&path, session_key)?;
        let slot = Arc::new(RwLock::new(SessionSlot { session, path, last_touch_ms }));
        cache.insert(session_key.to_string(), slot.clone());
        Ok(slot)
    }

    /// Check `session_key` against the lifecycle rules and, if it's due for
    /// rotation, archive its current file and replace the cached slot with
    /// a fresh, empty session under the same key. A no-op when lifecycle
    /// rotation isn't configured, or the session hasn't gone idle or
    /// crossed a reset boundary.
    fn maybe_rotate(&self, session_key: &str, slot: &Arc<RwLock<SessionSlot>>) -> Result<()> {
        let channel = session_key.split(':').next().unwrap_or(session_key);
        let rule = self.lifecycle.resolve(channel);
        if !rule.is_active() {
            return Ok(());
        }

        let now_ms = Utc::now().timestamp_millis();
        let mut guard = slot.write();
        if guard.session.messages.is_empty() {
            return Ok(());
        }
        if !rule.is_due(guard.last_touch_ms, now_ms) {
            return Ok(());
        }

        let archived = self.archived_path_for(session_key, now_ms);
        if guard.path.exists() {
            std::fs::rename(&guard.path, &archived).map_err(Error::Io)?;
        }

        guard.session = Session {
            session_key: session_key.to_string(),
            created_at_ms: now_ms,
            messages: Vec::new(),
        };
        guard.last_touch_ms = now_ms;
        tracing::info!(session_key, archived = %archived.display(), "rotated session on lifecycle boundary");
        Ok(())
    }

    /// Load (or create) a session and return a snapshot of its current
    /// messages. Creating doesn't write to disk until the first append.
    /// Applies lifecycle rotation first, so a session that's gone idle or
    /// crossed a daily reset boundary is handed back empty.
    pub fn messages(&self, session_key: &str) -> Result<Vec<Message>> {
        let slot = self.slot(session_key)?;
        self.maybe_rotate(session_key, &slot)?;
        let guard = slot.read();
        Ok(guard.session.messages.clone())
    }

    /// Whether `session_key` already has a session, without creating one.
    pub fn exists(&self, session_key: &str) -> bool {
        if self.cache.read().contains_key(session_key) {
            return true;
        }
        self.path_for(session_key).exists()
    }

    /// Append messages to a session's transcript, persisting them
    /// immediately. Creates the session (and its file) if this is the
    /// first touch.
    pub fn append(&self, session_key: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let slot = self.slot(session_key)?;
        self.maybe_rotate(session_key, &slot)?;
        let mut guard = slot.write();

        let is_new_file = !guard.path.exists();
        if let Some(dir) = guard.path.parent() {
            std::fs::create_dir_all(dir).map_err(Error::Io)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&guard.path)
            .map_err(Error::Io)?;

        let mut buf = String::new();
        if is_new_file {
            let meta = SessionRecord::Meta {
                session_key: guard.session.session_key.clone(),
                created_at_ms: guard.session.created_at_ms,
            };
            buf.push_str(&serde_json::to_string(&meta)?);
            buf.push('\n');
        }
        for msg in messages {
            buf.push_str(&serde_json::to_string(&SessionRecord::Msg(msg.clone()))?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes()).map_err(Error::Io)?;

        guard.session.messages.extend_from_slice(messages);
        guard.last_touch_ms = Utc::now().timestamp_millis();
        Ok(())
    }

    /// Replace a session's in-memory + on-disk messages wholesale. Used
    /// after compaction rewrites the context — the record
    /// stream is rewritten from scratch rather than appended to, since
    /// compaction drops earlier records rather than adding to them.
    pub fn replace(&self, session_key: &str, messages: Vec<Message>) -> Result<()> {
        let slot = self.slot(session_key)?;
        let mut guard = slot.write();

        if let Some(dir) = guard.path.parent() {
            std::fs::create_dir_all(dir).map_err(Error::Io)?;
        }

        let mut buf = String::new();
        let meta = SessionRecord::Meta {
            session_key: guard.session.session_key.clone(),
            created_at_ms: guard.session.created_at_ms,
        };
        buf.push_str(&serde_json::to_string(&meta)?);
        buf.push('\n');
        for msg in &messages {
            buf.push_str(&serde_json::to_string(&SessionRecord::Msg(msg.clone()))?);
            buf.push('\n');
        }

        atomic_write(&guard.path, buf.as_bytes())?;
        guard.session.messages = messages;
        guard.last_touch_ms = Utc::now().timestamp_millis();
        Ok(())
    }

    /// List every session key currently known (loaded or on disk).
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: std::collections::HashSet<String> = self.cache.read().keys().cloned().collect();
        if let Ok(entries) = std::fs::read_dir(&self.state_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                if let Ok(raw) = std::fs::read_to_string(&path) {
                    if let Some(first_line) = raw.lines().next() {
                        if let Ok(SessionRecord::Meta { session_key, .. }) =
                            serde_json::from_str::<SessionRecord>(first_line)
                        {
                            keys.insert(session_key);
                        }
                    }
                }
            }
        }
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys
    }
}

/// Loads a session from disk, along with its last-touch timestamp (the
/// file's mtime — the moment of its last append — or `created_at_ms` for a
/// session that doesn't exist on disk yet).
fn load_from_disk(path: &Path, session_key: &str) -> Result<(Session, i64)> {
    let now_ms = Utc::now().timestamp_millis();

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((
                Session {
                    session_key: session_key.to_string(),
                    created_at_ms: now_ms,
                    messages: Vec::new(),
                },
                now_ms,
            ));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let mut created_at_ms = now_ms;
    let mut messages = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionRecord>(line) {
            Ok(SessionRecord::Meta { created_at_ms: c, .. }) if i == 0 => created_at_ms = c,
            Ok(SessionRecord::Msg(msg)) => messages.push(msg),
            Ok(SessionRecord::Meta { .. }) => {
                tracing::warn!(path = %path.display(), line = i, "ignoring non-leading metadata record");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), line = i, error = %e, "skipping malformed session record");
            }
        }
    }

    let last_touch_ms = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(created_at_ms);

    Ok((
        Session {
            session_key: session_key.to_string(),
            created_at_ms,
            messages,
        },
        last_touch_ms,
    ))
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(Error::Io)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(Error::Io)?;
    tmp.write_all(contents).map_err(Error::Io)?;
    tmp.persist(path).map_err(|e| Error::Other(format!("renaming session file: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_has_no_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.messages("cli:alice").unwrap().is_empty());
        assert!(!store.exists("cli:alice"));
    }

    #[test]
    fn append_persists_and_is_visible_to_a_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::new(dir.path());
            store.append("cli:alice", &[Message::user("hi"), Message::assistant("hello")]).unwrap();
        }
        let reloaded = SessionStore::new(dir.path());
        let messages = reloaded.messages("cli:alice").unwrap();
        assert_eq!(messages.len(), 2);
        assert!(reloaded.exists("cli:alice"));
    }

    #[test]
    fn append_twice_accumulates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.append("cli:alice", &[Message::user("first")]).unwrap();
        store.append("cli:alice", &[Message::user("second")]).unwrap();
        let messages = store.messages("cli:alice").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content.extract_all_text(), "first");
        assert_eq!(messages[1].content.extract_all_text(), "second");
    }

    #[test]
    fn replace_rewrites_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.append("cli:alice", &[Message::user("a"), Message::user("b"), Message::user("c")]).unwrap();
        store.replace("cli:alice", vec![Message::system("compacted summary")]).unwrap();
        let messages = store.messages("cli:alice").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.extract_all_text(), "compacted summary");

        let reloaded = SessionStore::new(dir.path());
        assert_eq!(reloaded.messages("cli:alice").unwrap().len(), 1);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{}.jsonl", escape_key_for_filename("cli:alice")));
        std::fs::write(&path, "not json\n").unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.messages("cli:alice").unwrap().is_empty());
    }

    #[test]
    fn list_keys_finds_sessions_created_by_a_prior_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::new(dir.path());
            store.append("cli:alice", &[Message::user("hi")]).unwrap();
            store.append("discord:bob", &[Message::user("yo")]).unwrap();
        }
        let reloaded = SessionStore::new(dir.path());
        let keys = reloaded.list_keys();
        assert_eq!(keys, vec!["cli:alice".to_string(), "discord:bob".to_string()]);
    }

    /// Back-date a session file's mtime so a freshly constructed store
    /// sees it as last touched `minutes_ago` minutes in the past, the way
    /// it would look after a real idle gap or a process restart.
    fn backdate(path: &Path, minutes_ago: u64) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        let stale = std::time::SystemTime::now() - std::time::Duration::from_secs(minutes_ago * 60);
        file.set_modified(stale).unwrap();
    }

    #[test]
    fn idle_rotation_triggers_once_the_file_is_stale_enough() {
        use sa_domain::config::LifecycleConfig;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{}.jsonl", escape_key_for_filename("cli:alice")));
        {
            let store = SessionStore::new(dir.path());
            store.append("cli:alice", &[Message::user("before rotation")]).unwrap();
        }
        backdate(&path, 45);

        let lifecycle = LifecycleConfig { daily_reset_hour: None, idle_minutes: Some(30), ..LifecycleConfig::disabled() };
        let store = SessionStore::with_lifecycle(dir.path(), lifecycle);
        let messages = store.messages("cli:alice").unwrap();
        assert!(messages.is_empty(), "session should have rotated to empty on next touch");

        let archived: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("archived"))
            .collect();
        assert_eq!(archived.len(), 1);
        let archived_content = std::fs::read_to_string(archived[0].path()).unwrap();
        assert!(archived_content.contains("before rotation"));
    }

    #[test]
    fn idle_rotation_does_not_trigger_before_the_timeout() {
        use sa_domain::config::LifecycleConfig;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{}.jsonl", escape_key_for_filename("cli:alice")));
        {
            let store = SessionStore::new(dir.path());
            store.append("cli:alice", &[Message::user("still fresh")]).unwrap();
        }
        backdate(&path, 10);

        let lifecycle = LifecycleConfig { daily_reset_hour: None, idle_minutes: Some(30), ..LifecycleConfig::disabled() };
        let store = SessionStore::with_lifecycle(dir.path(), lifecycle);
        let messages = store.messages("cli:alice").unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn rotation_does_not_trigger_on_a_brand_new_session() {
        use sa_domain::config::LifecycleConfig;

        let dir = tempfile::tempdir().unwrap();
        let lifecycle = LifecycleConfig { daily_reset_hour: None, idle_minutes: Some(0), ..LifecycleConfig::disabled() };
        let store = SessionStore::with_lifecycle(dir.path(), lifecycle);

        assert!(store.messages("cli:alice").unwrap().is_empty());
        let archived = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(archived, 0, "nothing to archive on a session that was never touched");
    }

    #[test]
    fn rotated_session_accepts_fresh_history_under_the_same_key() {
        use sa_domain::config::LifecycleConfig;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{}.jsonl", escape_key_for_filename("cli:alice")));
        {
            let store = SessionStore::new(dir.path());
            store.append("cli:alice", &[Message::user("first era")]).unwrap();
        }
        backdate(&path, 45);

        let lifecycle = LifecycleConfig { daily_reset_hour: None, idle_minutes: Some(30), ..LifecycleConfig::disabled() };
        let store = SessionStore::with_lifecycle(dir.path(), lifecycle);
        store.append("cli:alice", &[Message::user("second era")]).unwrap();

        let messages = store.messages("cli:alice").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.extract_all_text(), "second era");
    }
}
