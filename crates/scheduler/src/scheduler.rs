//! The `Scheduler` actor.
//!
//! Holds the on-disk job store and arms one [`ActorRegistry::delayed`] timer
//! per enabled job. A fired timer always re-reads the job from the store
//! before acting — a concurrent `remove_job`/`enable_job(false)` call that
//! raced the timer is resolved in the store's favor, not the timer's stale
//! copy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;
use sa_registry::{ActorRegistry, AgentHandle, Actor, CancelToken, ChannelHandle, TurnMessage};

use crate::job::{compute_next_run, Job};
use crate::store::CronStore;

/// Name the agent actor registers itself under — resolved via
/// [`ActorRegistry::resolve_trait`] when a job's payload runs.
pub const AGENT_ACTOR_NAME: &str = "agent";

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Aggregate scheduler report: `{enabled, jobs_count, next_wake_at_ms}`.
/// `next_wake_at_ms` is the minimum `next_run_at_ms` across enabled jobs,
/// or `None` if no enabled job has one armed.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: usize,
    pub jobs_count: usize,
    pub next_wake_at_ms: Option<i64>,
}

pub struct Scheduler {
    store: CronStore,
    registry: Arc<ActorRegistry>,
    timers: Mutex<HashMap<String, CancelToken>>,
}

impl Scheduler {
    pub fn new(store: CronStore, registry: Arc<ActorRegistry>) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Add (or replace) a job and arm its timer immediately.
    pub fn add_job(self: &Arc<Self>, mut job: Job) -> Result<Job> {
        let base = now_ms();
        job.state.next_run_at_ms = compute_next_run(&job.schedule, base);
        job.updated_at_ms = base;
        self.store.put(job.clone())?;
        self.arm(job.clone());
        Ok(job)
    }

    /// Remove a job and disarm its timer. Idempotent.
    pub fn remove_job(self: &Arc<Self>, id: &str) -> Result<()> {
        self.disarm(id);
        self.store.remove(id)
    }

    /// Enable or disable a job. Disabling cancels the pending timer without
    /// deleting the job; re-enabling recomputes `next_run_at_ms` from now and
    /// re-arms.
    pub fn enable_job(self: &Arc<Self>, id: &str, enabled: bool) -> Result<Job> {
        let mut job = self
            .store
            .get(id)
            .ok_or_else(|| Error::Registry(format!("job not found: {id}")))?;
        job.enabled = enabled;
        job.updated_at_ms = now_ms();
        if enabled {
            job.state.next_run_at_ms = compute_next_run(&job.schedule, now_ms());
        } else {
            self.disarm(id);
        }
        self.store.put(job.clone())?;
        if enabled {
            self.arm(job.clone());
        }
        Ok(job)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.store.list()
    }

    /// Fetch a single job by id.
    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.store.get(id)
    }

    /// Aggregate report: `{enabled, jobs_count, next_wake_at_ms}`, where
    /// `next_wake_at_ms` is the minimum `next_run_at_ms` across enabled jobs.
    pub fn status(&self) -> SchedulerStatus {
        let jobs = self.store.list();
        let enabled_jobs: Vec<&Job> = jobs.iter().filter(|j| j.enabled).collect();
        let next_wake_at_ms = enabled_jobs
            .iter()
            .filter_map(|j| j.state.next_run_at_ms)
            .min();
        SchedulerStatus {
            enabled: enabled_jobs.len(),
            jobs_count: jobs.len(),
            next_wake_at_ms,
        }
    }

    /// Run a job immediately, out of band from its schedule. The job's
    /// `next_run_at_ms` is left untouched unless the run is one-shot
    /// (`delete_after_run`). When `force` is `false`, a disabled job is
    /// left untouched and this returns `Ok(false)` without executing the
    /// payload; when `force` is `true`, the enabled gate is bypassed.
    /// Returns whether the payload actually ran.
    pub async fn run_job(self: &Arc<Self>, id: &str, force: bool) -> Result<bool> {
        let job = self
            .store
            .get(id)
            .ok_or_else(|| Error::Registry(format!("job not found: {id}")))?;
        if !force && !job.enabled {
            return Ok(false);
        }
        self.fire(job.id.clone(), force).await;
        Ok(true)
    }

    fn arm(self: &Arc<Self>, job: Job) {
        let Some(next) = job.state.next_run_at_ms else {
            self.disarm(&job.id);
            return;
        };
        let delay_ms = (next - now_ms()).max(0) as u64;
        let scheduler = self.clone();
        let id = job.id.clone();
        let token = self
            .registry
            .delayed(Duration::from_millis(delay_ms), move || async move {
                scheduler.fire(id, false).await;
            });
        self.timers.lock().insert(job.id.clone(), token);
    }

    fn disarm(&self, id: &str) {
        if let Some(token) = self.timers.lock().remove(id) {
            token.cancel();
        }
    }

    /// Fired by a timer (or `run_job`). Re-reads the job — it may have been
    /// disabled or deleted since the timer was armed — runs its payload,
    /// records the outcome, and reschedules unless one-shot. `force`
    /// bypasses the enabled gate for a manual `run_job(id, force=true)`
    /// call; a timer-driven fire always passes `force=false`.
    async fn fire(self: &Arc<Self>, id: String, force: bool) {
        let Some(mut job) = self.store.get(&id) else {
            return;
        };
        if !force && !job.enabled {
            return;
        }

        let started = now_ms();
        let result = self.run_payload(&job).await;
        job.state.last_run_at_ms = Some(started);
        match &result {
            Ok(()) => {
                job.state.last_status = Some("ok".to_string());
                job.state.last_error = None;
            }
            Err(e) => {
                job.state.last_status = Some("error".to_string());
                job.state.last_error = Some(e.to_string());
                tracing::warn!(job = %job.id, error = %e, "cron job payload failed");
            }
        }
        TraceEvent::JobFired {
            job_id: job.id.clone(),
            status: job.state.last_status.clone().unwrap_or_default(),
        }
        .emit();

        if job.delete_after_run {
            if let Err(e) = self.store.remove(&job.id) {
                tracing::error!(job = %job.id, error = %e, "failed to remove one-shot job after run");
            }
            self.timers.lock().remove(&job.id);
            return;
        }

        job.state.next_run_at_ms = compute_next_run(&job.schedule, now_ms());
        if matches!(job.schedule, crate::job::Schedule::At { .. }) && job.state.next_run_at_ms.is_none() {
            // `at` schedules are one-time; once they've fired and aren't
            // `delete_after_run`, disable rather than leaving a dead timer.
            job.enabled = false;
        }
        if let Err(e) = self.store.put(job.clone()) {
            tracing::error!(job = %job.id, error = %e, "failed to persist job after run");
            return;
        }
        if job.enabled && job.state.next_run_at_ms.is_some() {
            self.arm(job);
        } else {
            self.timers.lock().remove(&job.id);
        }
    }

    async fn run_payload(&self, job: &Job) -> Result<()> {
        let agent = self
            .registry
            .resolve_trait::<dyn AgentHandle>(AGENT_ACTOR_NAME)?;

        let channel = job.payload.channel.clone().unwrap_or_else(|| "cli".to_string());
        let chat_id = job.payload.to.clone().unwrap_or_else(|| "direct".to_string());
        let msg = TurnMessage::new(channel.clone(), "cron", chat_id.clone(), job.payload.message.clone());
        let response = agent.process(msg).await;

        if job.payload.deliver {
            if job.payload.to.is_none() || job.payload.channel.is_none() {
                return Err(Error::Registry(
                    "delivering job payload missing channel or to".into(),
                ));
            }
            let channel = self.registry.resolve_trait::<dyn ChannelHandle>(&channel)?;
            channel.send_text(chat_id, response).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Actor for Scheduler {
    /// Recompute overdue `next_run_at_ms` for every enabled job. Arming the
    /// timers themselves happens in [`Scheduler::arm_all`], which needs
    /// `Arc<Self>` and so is called by the bootstrap sequence right after
    /// `ActorRegistry::spawn` returns.
    async fn on_start(&self) -> Result<()> {
        let base = now_ms();
        for mut job in self.store.list() {
            if !job.enabled {
                continue;
            }
            if job.state.next_run_at_ms.map(|t| t <= base).unwrap_or(true) {
                job.state.next_run_at_ms = compute_next_run(&job.schedule, base);
                self.store.put(job.clone())?;
            }
        }
        Ok(())
    }
}

impl Scheduler {
    /// Arm every enabled, scheduled job's timer. Split from `on_start`
    /// because arming needs `Arc<Self>` (the timer callback clones it) while
    /// `Actor::on_start` only gets `&self`.
    pub fn arm_all(self: &Arc<Self>) {
        for job in self.store.list() {
            if job.enabled && job.state.next_run_at_ms.is_some() {
                self.arm(job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Payload, Schedule};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAgent {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AgentHandle for CountingAgent {
        async fn process(&self, _msg: TurnMessage) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            "ok".to_string()
        }
        async fn process_stream(
            &self,
            _msg: TurnMessage,
        ) -> sa_domain::stream::BoxStream<'static, sa_domain::stream::AgentChunk> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(futures_util::stream::iter(vec![sa_domain::stream::AgentChunk::Done]))
        }
        async fn announce(&self, _channel: String, _chat_id: String, _content: String) -> String {
            String::new()
        }
    }

    fn scheduler_with_agent(dir: &std::path::Path) -> (Arc<Scheduler>, Arc<CountingAgent>) {
        let registry = ActorRegistry::new();
        let agent = Arc::new(CountingAgent {
            calls: AtomicUsize::new(0),
        });
        registry.register_trait_object::<dyn AgentHandle>(AGENT_ACTOR_NAME, agent.clone());
        let store = CronStore::load(dir.join("jobs.json")).unwrap();
        (Scheduler::new(store, registry), agent)
    }

    #[tokio::test]
    async fn add_job_fires_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, agent) = scheduler_with_agent(dir.path());

        let job = Job {
            id: "j1".into(),
            name: "ping".into(),
            enabled: true,
            schedule: Schedule::Every { every_ms: 1_000_000 },
            payload: Payload::agent_turn("ping"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: false,
        };
        scheduler.add_job(job.clone()).unwrap();
        let ran = scheduler.run_job("j1", false).await.unwrap();
        assert!(ran);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);

        let stored = scheduler.get_job("j1").unwrap();
        assert_eq!(stored.state.last_status.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn one_shot_job_deleted_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _agent) = scheduler_with_agent(dir.path());

        let job = Job {
            id: "once".into(),
            name: "once".into(),
            enabled: true,
            schedule: Schedule::At { at_ms: now_ms() + 10 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: true,
        };
        scheduler.add_job(job).unwrap();
        let ran = scheduler.run_job("once", false).await.unwrap();
        assert!(ran);
        assert!(scheduler.get_job("once").is_none());
    }

    #[tokio::test]
    async fn disabling_a_job_cancels_its_timer() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, agent) = scheduler_with_agent(dir.path());

        let job = Job {
            id: "j2".into(),
            name: "j2".into(),
            enabled: true,
            schedule: Schedule::Every { every_ms: 20 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: false,
        };
        scheduler.add_job(job).unwrap();
        scheduler.enable_job("j2", false).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn removing_missing_job_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _agent) = scheduler_with_agent(dir.path());
        scheduler.remove_job("ghost").unwrap();
    }

    #[tokio::test]
    async fn run_job_on_disabled_job_is_a_no_op_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, agent) = scheduler_with_agent(dir.path());

        let job = Job {
            id: "j3".into(),
            name: "j3".into(),
            enabled: false,
            schedule: Schedule::Every { every_ms: 1_000_000 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: false,
        };
        scheduler.add_job(job).unwrap();
        scheduler.enable_job("j3", false).unwrap();

        let ran = scheduler.run_job("j3", false).await.unwrap();
        assert!(!ran);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_job_with_force_bypasses_the_enabled_gate() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, agent) = scheduler_with_agent(dir.path());

        let job = Job {
            id: "j4".into(),
            name: "j4".into(),
            enabled: false,
            schedule: Schedule::Every { every_ms: 1_000_000 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: false,
        };
        scheduler.add_job(job).unwrap();
        scheduler.enable_job("j4", false).unwrap();

        let ran = scheduler.run_job("j4", true).await.unwrap();
        assert!(ran);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);

        let stored = scheduler.get_job("j4").unwrap();
        assert_eq!(stored.state.last_status.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn status_reports_aggregate_counts_and_min_next_wake() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _agent) = scheduler_with_agent(dir.path());

        let far = Job {
            id: "far".into(),
            name: "far".into(),
            enabled: true,
            schedule: Schedule::Every { every_ms: 1_000_000 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: false,
        };
        let near = Job {
            id: "near".into(),
            name: "near".into(),
            enabled: true,
            schedule: Schedule::Every { every_ms: 1_000 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: false,
        };
        let disabled = Job {
            id: "off".into(),
            name: "off".into(),
            enabled: false,
            schedule: Schedule::Every { every_ms: 1 },
            payload: Payload::agent_turn("hi"),
            state: Default::default(),
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            delete_after_run: false,
        };
        scheduler.add_job(far).unwrap();
        let near = scheduler.add_job(near).unwrap();
        scheduler.add_job(disabled).unwrap();
        scheduler.enable_job("off", false).unwrap();

        let status = scheduler.status();
        assert_eq!(status.jobs_count, 3);
        assert_eq!(status.enabled, 2);
        assert_eq!(status.next_wake_at_ms, near.state.next_run_at_ms);
    }
}
