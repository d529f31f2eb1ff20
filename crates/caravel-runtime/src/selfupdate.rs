//! Self-update scheduling.
//!
//! When `SelfUpdate` is configured the manager arms an updater that
//! invokes the host-supplied [`UpdateTrigger`] every interval. The first
//! due time is randomized within `[0, interval)` so a fleet of agents
//! sharing a rollout does not hit the package repository in lockstep.
//! The concrete trigger (a platform package-manager invocation) is an
//! external collaborator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Host-supplied update action.
#[async_trait]
pub trait UpdateTrigger: Send + Sync {
    /// Kicks off one update check/installation.
    async fn trigger(&self) -> anyhow::Result<()>;
}

/// An armed self-update schedule.
pub struct SelfUpdater {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SelfUpdater {
    /// Arms the schedule. `interval` must be non-zero.
    pub fn arm(interval: Duration, trigger: Arc<dyn UpdateTrigger>) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();

        let initial = initial_due(interval);
        info!(
            interval_secs = interval.as_secs(),
            initial_secs = initial.as_secs(),
            "Self-update armed"
        );

        let handle = tokio::spawn(async move {
            let mut due = initial;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(due) => {}
                }
                if let Err(e) = trigger.trigger().await {
                    warn!(error = %e, "Self-update trigger failed");
                }
                due = interval;
            }
        });

        Self { token, handle }
    }

    /// Disarms the schedule and waits for the worker to exit.
    pub async fn disarm(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

/// First due time, drawn uniformly from `[0, interval)`.
fn initial_due(interval: Duration) -> Duration {
    let millis = interval.as_millis() as u64;
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTrigger {
        fired: AtomicUsize,
    }

    #[async_trait]
    impl UpdateTrigger for CountingTrigger {
        async fn trigger(&self) -> anyhow::Result<()> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_initial_due_within_interval() {
        let interval = Duration::from_secs(600);
        for _ in 0..200 {
            assert!(initial_due(interval) < interval);
        }
    }

    #[tokio::test]
    async fn test_trigger_fires_and_disarms() {
        let trigger = Arc::new(CountingTrigger {
            fired: AtomicUsize::new(0),
        });
        let updater = SelfUpdater::arm(Duration::from_millis(5), trigger.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        updater.disarm().await;
        let fired = trigger.fired.load(Ordering::SeqCst);
        assert!(fired >= 1);

        // Nothing fires after disarm.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(trigger.fired.load(Ordering::SeqCst), fired);
    }
}
