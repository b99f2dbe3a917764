use std::time::Duration;

use async_trait::async_trait;

use sa_domain::error::Result;

/// Implemented by every long-lived component registered in an
/// [`ActorRegistry`](crate::registry::ActorRegistry).
///
/// `on_start` runs once at `spawn` time and again after every supervised
/// restart. `run` is the actor's main loop; actors that are purely
/// call/response (the agent, the scheduler) never return from `on_start`
/// early and simply leave `run` at its default no-op — there is nothing
/// for supervision to restart.
#[async_trait]
pub trait Actor: Send + Sync + 'static {
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    async fn run(self: std::sync::Arc<Self>) -> Result<()> {
        Ok(())
    }
}

/// When an actor's `run` loop exits with an error, should it be restarted?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    Never,
    OnFailure,
}

/// Supervision policy for a single actor.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub mode: RestartMode,
    pub max_restarts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RestartPolicy {
    /// Actors that never crash-restart (the default for agent, scheduler —
    /// "the containing process decides").
    pub const fn never() -> Self {
        Self {
            mode: RestartMode::Never,
            max_restarts: 0,
            min_backoff: Duration::from_secs(0),
            max_backoff: Duration::from_secs(0),
        }
    }

    /// The channel default: on-failure, max 10 restarts, 1s..60s backoff.
    pub const fn channel_default() -> Self {
        Self {
            mode: RestartMode::OnFailure,
            max_restarts: 10,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }

    /// Exponential backoff for the `n`th restart (0-indexed), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = self.max_backoff.as_millis() as u64;
        let scaled = min.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX).max(1));
        Duration::from_millis(scaled.min(max.max(min)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RestartPolicy::channel_default();
        assert_eq!(p.backoff_for(0), Duration::from_secs(1));
        assert_eq!(p.backoff_for(1), Duration::from_secs(2));
        assert_eq!(p.backoff_for(2), Duration::from_secs(4));
        assert_eq!(p.backoff_for(10), Duration::from_secs(60)); // capped
    }
}
