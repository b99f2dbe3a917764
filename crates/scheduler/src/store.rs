//! On-disk cron job store.
//!
//! The document is `{"version":1,"jobs":[...]}`, written atomically via a
//! temp file + rename in the same directory so a crash mid-write never
//! leaves a torn file behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};

use crate::job::Job;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDoc {
    version: u32,
    jobs: Vec<Job>,
}

/// In-memory cache of jobs backed by a JSON file on disk.
pub struct CronStore {
    path: PathBuf,
    jobs: RwLock<HashMap<String, Job>>,
}

impl CronStore {
    /// Load `path` if it exists; an absent file starts empty (first run).
    /// A corrupt or unreadable file is treated as empty rather than fatal —
    /// the scheduler should still come up so new jobs can be added.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let jobs = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<StoreDoc>(&raw) {
                Ok(doc) => doc.jobs.into_iter().map(|j| (j.id.clone(), j)).collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cron store file unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::Registry(format!("reading cron store: {e}"))),
        };
        Ok(Self {
            path,
            jobs: RwLock::new(jobs),
        })
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        jobs
    }

    /// Insert or replace a job, then persist the whole store.
    pub fn put(&self, job: Job) -> Result<()> {
        self.jobs.write().insert(job.id.clone(), job);
        self.flush()
    }

    /// Remove a job by id. No-op (not an error) if it's already gone —
    /// callers may race a delete against a firing timer.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.jobs.write().remove(id);
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let doc = StoreDoc {
            version: 1,
            jobs: self.list(),
        };
        let body = serde_json::to_string_pretty(&doc)
            .map_err(|e| Error::Registry(format!("serializing cron store: {e}")))?;
        atomic_write(&self.path, body.as_bytes())
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| Error::Registry(format!("creating cron store dir: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::Registry(format!("creating cron store temp file: {e}")))?;
    std::io::Write::write_all(&mut tmp, contents)
        .map_err(|e| Error::Registry(format!("writing cron store temp file: {e}")))?;
    tmp.persist(path)
        .map_err(|e| Error::Registry(format!("renaming cron store temp file: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Payload, Schedule};

    fn job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            name: id.to_string(),
            enabled: true,
            schedule: Schedule::Every { every_ms: 1000 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: 0,
            updated_at_ms: 0,
            delete_after_run: false,
        }
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::load(dir.path().join("jobs.json")).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn put_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        {
            let store = CronStore::load(&path).unwrap();
            store.put(job("a")).unwrap();
            store.put(job("b")).unwrap();
        }
        let reloaded = CronStore::load(&path).unwrap();
        assert_eq!(reloaded.list().len(), 2);
        assert!(reloaded.get("a").is_some());
    }

    #[test]
    fn remove_missing_job_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::load(dir.path().join("jobs.json")).unwrap();
        store.remove("ghost").unwrap();
    }

    #[test]
    fn corrupt_file_loads_empty_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = CronStore::load(&path).unwrap();
        assert!(store.list().is_empty());
    }
}
