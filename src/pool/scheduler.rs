//! Supervised background loop driving fetch and check cycles
//!
//! One cycle = fetch all sources, then check the due proxies. The loop
//! runs on a single tokio task and is never re-entered: a cycle either
//! completes and sleeps the full interval, or fails, is logged and sleeps
//! the cooldown before the whole cycle is retried. Shutdown is only
//! observed between cycles; an in-flight cycle is never cancelled.

use crate::pool::checker::HealthChecker;
use crate::pool::fetcher::SourceFetcher;
use crate::pool::store::ProxyStore;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Default seconds between refresh cycles
const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Default seconds to back off after a failed cycle
const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Configuration for the refresh scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between successful cycles
    pub interval: Duration,
    /// Sleep after a failed cycle before retrying the full cycle
    pub cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// The two states of the refresh loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Running,
}

/// Scheduler owning the periodic fetch-then-check cycle
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<ProxyStore>,
    fetcher: Arc<SourceFetcher>,
    checker: Arc<HealthChecker>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<ProxyStore>,
        fetcher: Arc<SourceFetcher>,
        checker: Arc<HealthChecker>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            checker,
        }
    }

    /// Spawn the loop on a background task, returning its handle
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(
            interval_secs = self.config.interval.as_secs(),
            cooldown_secs = self.config.cooldown.as_secs(),
            "starting proxy pool scheduler"
        );
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            let mut state = SchedulerState::Running;
            debug!(?state, "starting refresh cycle");

            // Any failure inside the cycle lands here; the loop itself
            // never terminates on error.
            let delay = match self.run_cycle().await {
                Ok(()) => self.config.interval,
                Err(e) => {
                    error!(error = %e, "refresh cycle failed, backing off");
                    self.config.cooldown
                }
            };

            state = SchedulerState::Idle;
            debug!(?state, delay_secs = delay.as_secs(), "cycle finished");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full cycle: grow the pool, then separate live from dead
    async fn run_cycle(&self) -> Result<()> {
        let fetched = self.fetcher.fetch_all(&self.store).await?;
        let checked = self.checker.check_due(&self.store).await?;

        info!(
            new_candidates = fetched.new_candidates,
            failed_sources = fetched.failed_sources,
            working = checked.working,
            evicted = checked.evicted,
            "refresh cycle complete"
        );

        Ok(())
    }
}

/// Handle to a spawned scheduler task
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the loop to exit.
    ///
    /// An in-flight cycle finishes first; a sleeping loop wakes up
    /// immediately.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::checker::CheckerConfig;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));
        assert_eq!(config.cooldown, Duration::from_secs(DEFAULT_COOLDOWN_SECS));
    }

    #[test]
    fn test_scheduler_config_builder() {
        let config = SchedulerConfig::new()
            .with_interval(Duration::from_secs(120))
            .with_cooldown(Duration::from_secs(5));

        assert_eq!(config.interval, Duration::from_secs(120));
        assert_eq!(config.cooldown, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_scheduler_runs_a_cycle_and_shuts_down() {
        let file = NamedTempFile::new().unwrap();
        let store = Arc::new(
            ProxyStore::connect(file.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        // No sources and no proxies: the cycle is a cheap no-op
        let fetcher = Arc::new(SourceFetcher::new().unwrap());
        let checker = Arc::new(HealthChecker::with_config(
            CheckerConfig::new().with_timeout(Duration::from_secs(1)),
        ));

        let scheduler = Scheduler::new(
            SchedulerConfig::new().with_interval(Duration::from_secs(3600)),
            Arc::clone(&store),
            fetcher,
            checker,
        );
        let handle = scheduler.spawn();

        // Let the first cycle land, then ask for shutdown mid-sleep
        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler should stop promptly");
    }
}
