use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use sa_domain::error::{Error, Result};

use crate::actor::{Actor, RestartMode, RestartPolicy};

/// Cancellation handle for a [`ActorRegistry::delayed`] timer.
///
/// Dropping this does *not* cancel the timer — call [`CancelToken::cancel`]
/// explicitly. Cancellation is best-effort: if the timer has already begun
/// running its callback, the callback completes.
#[derive(Clone)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Name-based registry of long-lived actors.
///
/// Resolution is always by name — actors never hold direct `Arc<T>`
/// references to peers, they re-resolve through here every time, which is
/// what makes cyclic runtime relationships (agent ↔ scheduler) compile
/// without a cyclic type graph.
pub struct ActorRegistry {
    entries: RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl ActorRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Register and start a concrete actor under `name`, running its
    /// `on_start` hook. If `policy` is `on-failure`, a supervised run loop
    /// is spawned that restarts `actor.run()` with exponential backoff.
    pub async fn spawn<A: Actor>(
        self: &Arc<Self>,
        name: impl Into<String>,
        policy: RestartPolicy,
        actor: Arc<A>,
    ) -> Result<Arc<A>> {
        let name = name.into();
        actor
            .on_start()
            .await
            .map_err(|e| Error::Registry(format!("{name}: on_start failed: {e}")))?;
        self.entries
            .write()
            .insert(name.clone(), Box::new(actor.clone()));
        tracing::info!(actor = %name, "actor registered");

        if policy.mode == RestartMode::OnFailure {
            let registry = self.clone();
            let supervised = actor.clone();
            tokio::spawn(async move {
                registry.supervise(name, supervised, policy).await;
            });
        }
        Ok(actor)
    }

    /// Register a trait object under `name` without starting a supervised
    /// loop (used for seams like `AgentHandle`/`ChannelHandle` where the
    /// concrete actor was already spawned separately).
    pub fn register_trait_object<T>(&self, name: impl Into<String>, obj: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let name = name.into();
        self.entries.write().insert(name.clone(), Box::new(obj));
        tracing::info!(actor = %name, "trait object registered");
    }

    /// Resolve a concrete actor by name.
    pub fn resolve<A: Actor>(&self, name: &str) -> Result<Arc<A>> {
        self.entries
            .read()
            .get(name)
            .and_then(|b| b.downcast_ref::<Arc<A>>())
            .cloned()
            .ok_or_else(|| Error::Registry(format!("actor not found: {name}")))
    }

    /// Resolve a trait-object seam by name (e.g. `resolve_trait::<dyn AgentHandle>("agent")`).
    pub fn resolve_trait<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .read()
            .get(name)
            .and_then(|b| b.downcast_ref::<Arc<T>>())
            .cloned()
            .ok_or_else(|| Error::Registry(format!("actor not found: {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Deregister an actor. Subsequent `resolve`/`resolve_trait` calls fail.
    pub fn remove(&self, name: &str) {
        self.entries.write().remove(name);
    }

    /// Schedule `f` to run once after `after`. This is the sole primitive the
    /// scheduler uses to arm timers against itself.
    pub fn delayed<F, Fut>(&self, after: Duration, f: F) -> CancelToken
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => { f().await; }
                _ = child.cancelled() => {}
            }
        });
        CancelToken(token)
    }

    /// Runs `actor.run()` in a loop, restarting on error with exponential
    /// backoff bounded by `policy`, within a rolling window of
    /// `10 * max_backoff`. Once `max_restarts` is exceeded inside the
    /// window, the actor is deregistered permanently.
    async fn supervise<A: Actor>(self: Arc<Self>, name: String, actor: Arc<A>, policy: RestartPolicy) {
        let mut restarts: VecDeque<Instant> = VecDeque::new();
        let window = policy.max_backoff.max(Duration::from_secs(1)) * 10;

        loop {
            let running = actor.clone();
            match running.run().await {
                Ok(()) => {
                    tracing::info!(actor = %name, "actor run loop exited cleanly");
                    break;
                }
                Err(e) => {
                    tracing::warn!(actor = %name, error = %e, "actor run loop failed");

                    let now = Instant::now();
                    while let Some(front) = restarts.front() {
                        if now.duration_since(*front) > window {
                            restarts.pop_front();
                        } else {
                            break;
                        }
                    }

                    if restarts.len() as u32 >= policy.max_restarts {
                        tracing::error!(actor = %name, max_restarts = policy.max_restarts, "restart budget exhausted, deregistering");
                        self.remove(&name);
                        break;
                    }

                    let attempt = restarts.len() as u32;
                    restarts.push_back(now);
                    tokio::time::sleep(policy.backoff_for(attempt)).await;

                    if let Err(e) = actor.on_start().await {
                        tracing::error!(actor = %name, error = %e, "on_start failed during restart, retrying");
                    }
                }
            }
        }
    }
}
