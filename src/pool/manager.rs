//! Pool manager owning the store handle and the scheduler lifecycle
//!
//! An explicitly constructed component: callers build one, `start()` the
//! background refresh loop, and pass the pool by reference wherever a
//! proxy is needed. There is no process-wide singleton.

use crate::pool::checker::{CheckSummary, CheckerConfig, HealthChecker};
use crate::pool::fetcher::{FetchSummary, FetcherConfig, SourceFetcher};
use crate::pool::models::{ParserKind, ProxySourceRecord};
use crate::pool::scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};
use crate::pool::selector::ProxySelector;
use crate::pool::store::ProxyStore;
use crate::Result;
use std::sync::Arc;

/// Default database file path
const DEFAULT_DATABASE_PATH: &str = "proxies.db";

/// Top-level pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// SQLite database file path
    pub database_path: String,
    pub scheduler: SchedulerConfig,
    pub fetcher: FetcherConfig,
    pub checker: CheckerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            scheduler: SchedulerConfig::default(),
            fetcher: FetcherConfig::default(),
            checker: CheckerConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database_path(mut self, path: String) -> Self {
        self.database_path = path;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_checker(mut self, checker: CheckerConfig) -> Self {
        self.checker = checker;
        self
    }
}

/// Snapshot of the pool for status reporting
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub total: i64,
    pub working: i64,
    /// A rotation-selected proxy with its credentials masked
    pub sample: Option<String>,
}

/// The proxy pool: store, fetcher, checker and scheduler under one handle
pub struct ProxyPool {
    store: Arc<ProxyStore>,
    fetcher: Arc<SourceFetcher>,
    checker: Arc<HealthChecker>,
    scheduler_config: SchedulerConfig,
    scheduler: Option<SchedulerHandle>,
}

impl ProxyPool {
    /// Open the store, seed the default sources and assemble the pool.
    ///
    /// The background loop is not started yet; call [`start`](Self::start).
    pub async fn connect(config: PoolConfig) -> Result<Self> {
        let store = ProxyStore::connect(&config.database_path).await?;
        for (url, kind) in SourceFetcher::default_sources() {
            store.upsert_source_ignore(url, kind).await?;
        }

        Ok(Self {
            store: Arc::new(store),
            fetcher: Arc::new(SourceFetcher::with_config(config.fetcher)?),
            checker: Arc::new(HealthChecker::with_config(config.checker)),
            scheduler_config: config.scheduler,
            scheduler: None,
        })
    }

    /// Start the background refresh loop. A second call while the loop is
    /// alive is a no-op; the scheduler never runs concurrently with itself.
    pub fn start(&mut self) {
        if self.scheduler.is_some() {
            return;
        }

        let scheduler = Scheduler::new(
            self.scheduler_config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.checker),
        );
        self.scheduler = Some(scheduler.spawn());
    }

    /// Stop the background refresh loop and wait for it to exit
    pub async fn stop(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.shutdown().await;
        }
    }

    /// Whether the background refresh loop is running
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Pick a working proxy connection string, or `None` when the pool is
    /// empty. Callers omit the proxy option in that case.
    pub async fn get_proxy(&self) -> Result<Option<String>> {
        ProxySelector::pick(&self.store).await
    }

    /// Run one fetch pass outside the schedule
    pub async fn fetch_once(&self) -> Result<FetchSummary> {
        self.fetcher.fetch_all(&self.store).await
    }

    /// Run one health check pass outside the schedule
    pub async fn check_once(&self) -> Result<CheckSummary> {
        self.checker.check_due(&self.store).await
    }

    /// Pool totals plus a credential-masked sample proxy
    pub async fn status(&self) -> Result<PoolStatus> {
        let total = self.store.count_proxies().await?;
        let working = self.store.count_working().await?;
        let sample = self
            .store
            .top_working(1)
            .await?
            .first()
            .map(|record| record.proxy().masked_url());

        Ok(PoolStatus {
            total,
            working,
            sample,
        })
    }

    /// Register an extra source. Returns false if the URL was already known.
    pub async fn add_source(&self, url: &str, kind: ParserKind) -> Result<bool> {
        self.store.upsert_source_ignore(url, kind).await
    }

    /// Disable a source by URL. Returns false if no source matched.
    pub async fn disable_source(&self, url: &str) -> Result<bool> {
        self.store.disable_source(url).await
    }

    /// All registered sources, enabled or not
    pub async fn list_sources(&self) -> Result<Vec<ProxySourceRecord>> {
        self.store.list_sources().await
    }

    /// Direct access to the store, e.g. for maintenance commands
    pub fn store(&self) -> &ProxyStore {
        &self.store
    }
}
