//! Health checker probing proxies for liveness
//!
//! Probes the due set concurrently with bounded parallelism, records
//! every outcome in the store, then evicts proxies that have stayed dead
//! past the failure threshold.

use crate::pool::models::{ProbeOutcome, Proxy};
use crate::pool::store::ProxyStore;
use crate::Result;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Default timeout for each probe request in seconds
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent probes
const DEFAULT_CONCURRENCY: usize = 10;

/// Default probe targets, in order: a generic reachability check, then
/// the platform the proxies are ultimately used against
const DEFAULT_TEST_URLS: [&str; 2] = [
    "https://www.google.com",
    "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
];

/// Default eviction threshold: dead proxies with more failures are removed
const DEFAULT_MAX_FAIL_COUNT: i64 = 5;

/// Default staleness window after which a non-working proxy is rechecked
const DEFAULT_RECHECK_WINDOW_HOURS: i64 = 24;

/// Configuration for the health checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each request of a probe
    pub timeout: Duration,
    /// Number of concurrent probes
    pub concurrency: usize,
    /// Ordered endpoints a probe tries until one answers 2xx
    pub test_urls: Vec<String>,
    /// Dead proxies beyond this fail count are evicted
    pub max_fail_count: i64,
    /// Staleness window for rechecking non-working proxies
    pub recheck_window: chrono::Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            test_urls: DEFAULT_TEST_URLS.iter().map(|s| s.to_string()).collect(),
            max_fail_count: DEFAULT_MAX_FAIL_COUNT,
            recheck_window: chrono::Duration::hours(DEFAULT_RECHECK_WINDOW_HOURS),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_test_urls(mut self, urls: Vec<String>) -> Self {
        self.test_urls = urls;
        self
    }

    pub fn with_max_fail_count(mut self, max_fail_count: i64) -> Self {
        self.max_fail_count = max_fail_count;
        self
    }

    pub fn with_recheck_window(mut self, window: chrono::Duration) -> Self {
        self.recheck_window = window;
        self
    }
}

/// Summary of one health check cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckSummary {
    pub checked: usize,
    pub working: usize,
    pub failed: usize,
    pub evicted: u64,
}

/// Health checker for validating pooled proxies
#[derive(Clone)]
pub struct HealthChecker {
    config: CheckerConfig,
}

impl HealthChecker {
    /// Create a new health checker with default configuration
    pub fn new() -> Self {
        Self {
            config: CheckerConfig::default(),
        }
    }

    /// Create a new health checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Probe every proxy due for (re)validation, record the outcomes and
    /// evict persistently dead entries.
    ///
    /// Eviction only runs once every probe of the cycle has completed.
    pub async fn check_due(&self, store: &ProxyStore) -> Result<CheckSummary> {
        let due = store.list_due_for_check(self.config.recheck_window).await?;
        if due.is_empty() {
            debug!("no proxies due for a check");
            return Ok(CheckSummary::default());
        }

        info!(count = due.len(), "checking proxies");
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        let outcomes: Vec<(i64, ProbeOutcome)> = stream::iter(due)
            .map(|record| {
                let sem = Arc::clone(&semaphore);
                let checker = self.clone();
                async move {
                    // Semaphore acquire only fails if the semaphore is closed,
                    // which won't happen here since we own the Arc and keep it
                    // alive for the duration of the check operation.
                    let _permit = sem
                        .acquire()
                        .await
                        .expect("Semaphore closed unexpectedly");
                    let outcome = checker.probe(&record.proxy()).await;
                    (record.id, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut summary = CheckSummary {
            checked: outcomes.len(),
            ..CheckSummary::default()
        };

        for (id, outcome) in &outcomes {
            if outcome.working {
                summary.working += 1;
            } else {
                summary.failed += 1;
            }
            store
                .update_health(*id, outcome.working, outcome.response_time_ms)
                .await?;
        }

        summary.evicted = store
            .delete_dead_beyond_threshold(self.config.max_fail_count)
            .await?;

        info!(
            working = summary.working,
            failed = summary.failed,
            evicted = summary.evicted,
            "health check cycle complete"
        );

        Ok(summary)
    }

    /// Probe a single proxy against the configured test endpoints.
    ///
    /// The probe succeeds at the first endpoint answering 2xx within the
    /// timeout and records the elapsed time; otherwise it fails with no
    /// response time.
    pub async fn probe(&self, proxy: &Proxy) -> ProbeOutcome {
        let client = match self.proxy_client(proxy) {
            Ok(client) => client,
            Err(e) => {
                debug!(proxy = %proxy.masked_url(), error = %e, "could not build probe client");
                return ProbeOutcome::failure();
            }
        };

        for url in &self.config.test_urls {
            let start = Instant::now();
            match tokio::time::timeout(self.config.timeout, client.get(url).send()).await {
                Ok(Ok(response)) if response.status().is_success() => {
                    let elapsed = start.elapsed().as_millis() as i64;
                    debug!(proxy = %proxy.masked_url(), url = %url, elapsed_ms = elapsed, "probe ok");
                    return ProbeOutcome::success(elapsed);
                }
                Ok(Ok(response)) => {
                    debug!(proxy = %proxy.masked_url(), url = %url, status = %response.status(), "probe got non-success status");
                }
                Ok(Err(e)) => {
                    debug!(proxy = %proxy.masked_url(), url = %url, error = %e, "probe request failed");
                }
                Err(_) => {
                    debug!(proxy = %proxy.masked_url(), url = %url, "probe timed out");
                }
            }
        }

        ProbeOutcome::failure()
    }

    /// Create a reqwest client routed through the proxy.
    ///
    /// `Proxy::all` covers both schemes: http test endpoints go through
    /// as absolute-form requests, https ones as CONNECT tunnels, and
    /// socks4/socks5 URLs are handled natively.
    fn proxy_client(&self, proxy: &Proxy) -> Result<Client> {
        let client = Client::builder()
            .proxy(ReqwestProxy::all(proxy.url())?)
            .timeout(self.config.timeout)
            .build()?;

        Ok(client)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::models::ProxyType;
    use mockito::Matcher;
    use tempfile::NamedTempFile;

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.test_urls.len(), 2);
        assert_eq!(config.max_fail_count, DEFAULT_MAX_FAIL_COUNT);
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_concurrency(20)
            .with_test_urls(vec!["http://example.com".to_string()])
            .with_max_fail_count(3)
            .with_recheck_window(chrono::Duration::hours(6));

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.test_urls, vec!["http://example.com"]);
        assert_eq!(config.max_fail_count, 3);
        assert_eq!(config.recheck_window, chrono::Duration::hours(6));
    }

    /// Stand up a mock HTTP proxy: for plain HTTP proxying the client
    /// sends an ordinary GET with an absolute-form request line, so a
    /// catch-all mock acts as a proxy that always "succeeds".
    async fn mock_proxy(status: usize) -> (mockito::ServerGuard, mockito::Mock, Proxy) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .with_status(status)
            .expect_at_least(0)
            .create_async()
            .await;

        let addr = server.host_with_port();
        let (host, port) = addr.rsplit_once(':').unwrap();
        let proxy = Proxy::new(host.to_string(), port.parse().unwrap(), ProxyType::Http);
        (server, mock, proxy)
    }

    fn fast_checker() -> HealthChecker {
        HealthChecker::with_config(
            CheckerConfig::new()
                .with_timeout(Duration::from_secs(2))
                .with_test_urls(vec!["http://probe-target.test/".to_string()]),
        )
    }

    #[tokio::test]
    async fn test_probe_success_records_response_time() {
        let (_server, _mock, proxy) = mock_proxy(200).await;
        let outcome = fast_checker().probe(&proxy).await;

        assert!(outcome.working);
        assert!(outcome.response_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_probe_non_success_status_fails() {
        let (_server, _mock, proxy) = mock_proxy(502).await;
        let outcome = fast_checker().probe(&proxy).await;

        assert!(!outcome.working);
        assert!(outcome.response_time_ms.is_none());
    }

    #[tokio::test]
    async fn test_probe_unreachable_proxy_fails() {
        // Port 9 (discard) on loopback: connection refused, no timeout wait
        let proxy = Proxy::new("127.0.0.1".to_string(), 9, ProxyType::Http);
        let outcome = fast_checker().probe(&proxy).await;

        assert!(!outcome.working);
        assert!(outcome.response_time_ms.is_none());
    }

    #[tokio::test]
    async fn test_check_due_updates_store_and_counts() {
        let file = NamedTempFile::new().unwrap();
        let store = ProxyStore::connect(file.path().to_str().unwrap())
            .await
            .unwrap();

        let (_server, _mock, good) = mock_proxy(200).await;
        let bad = Proxy::new("127.0.0.1".to_string(), 9, ProxyType::Http);
        store.upsert_ignore(&good, "test").await.unwrap();
        store.upsert_ignore(&bad, "test").await.unwrap();

        let summary = fast_checker().check_due(&store).await.unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.working, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.evicted, 0);

        let good_record = store
            .top_working(10)
            .await
            .unwrap()
            .into_iter()
            .next()
            .expect("good proxy recorded as working");
        assert_eq!(good_record.ip, good.host);
        assert_eq!(good_record.success_count, 1);
        assert_eq!(good_record.fail_count, 0);
        assert!(good_record.response_time_ms.is_some());

        let bad_record = store
            .list_due_for_check(chrono::Duration::zero())
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.ip == bad.host && r.port == bad.port)
            .expect("bad proxy still present");
        assert!(!bad_record.working);
        assert_eq!(bad_record.success_count, 0);
        assert_eq!(bad_record.fail_count, 1);
    }

    #[tokio::test]
    async fn test_check_due_evicts_after_threshold() {
        let file = NamedTempFile::new().unwrap();
        let store = ProxyStore::connect(file.path().to_str().unwrap())
            .await
            .unwrap();

        let bad = Proxy::new("127.0.0.1".to_string(), 9, ProxyType::Http);
        store.upsert_ignore(&bad, "test").await.unwrap();

        let checker = HealthChecker::with_config(
            CheckerConfig::new()
                .with_timeout(Duration::from_secs(2))
                .with_test_urls(vec!["http://probe-target.test/".to_string()])
                .with_max_fail_count(1)
                .with_recheck_window(chrono::Duration::zero()),
        );

        // First failure stays within the threshold, second crosses it
        let summary = checker.check_due(&store).await.unwrap();
        assert_eq!(summary.evicted, 0);
        let summary = checker.check_due(&store).await.unwrap();
        assert_eq!(summary.evicted, 1);
        assert_eq!(store.count_proxies().await.unwrap(), 0);
    }
}
