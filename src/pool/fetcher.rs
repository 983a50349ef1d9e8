//! Source fetcher growing the candidate pool
//!
//! Pulls raw text from every enabled source, runs the matching parser and
//! upserts the candidates. One failing source never aborts the batch.

use crate::pool::models::ParserKind;
use crate::pool::parser::ProxyParser;
use crate::pool::store::ProxyStore;
use crate::Result;
use anyhow::bail;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for source fetches in seconds
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default user agent for source fetches
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration for the source fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for each source request
    pub timeout: Duration,
    /// User agent for source requests
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Summary of one fetch pass over the enabled sources
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchSummary {
    pub fetched_sources: usize,
    pub skipped_sources: usize,
    pub failed_sources: usize,
    pub new_candidates: usize,
}

/// Fetcher pulling candidate proxies from the registered sources
pub struct SourceFetcher {
    config: FetcherConfig,
    client: Client,
}

impl SourceFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a new fetcher with custom configuration
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// The fixed bootstrap source set: public plain `ip:port` lists plus
    /// one list that needs the tolerant parser.
    pub fn default_sources() -> Vec<(&'static str, ParserKind)> {
        vec![
            (
                "https://www.proxy-list.download/api/v1/get?type=http",
                ParserKind::SimpleList,
            ),
            (
                "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
                ParserKind::SimpleList,
            ),
            (
                "https://raw.githubusercontent.com/ShiftyTR/Proxy-List/master/http.txt",
                ParserKind::SimpleList,
            ),
            (
                "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list.txt",
                ParserKind::CustomFormat,
            ),
            (
                "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt",
                ParserKind::SimpleList,
            ),
            (
                "https://api.proxyscrape.com/v2/?request=getproxies&protocol=http&timeout=10000&country=all",
                ParserKind::SimpleList,
            ),
        ]
    }

    /// Fetch every enabled source and upsert the parsed candidates.
    ///
    /// This is the sole growth path of the pool. Sources with the
    /// unimplemented `json` parser are skipped; fetch or parse trouble on
    /// one source is logged and the batch moves on.
    pub async fn fetch_all(&self, store: &ProxyStore) -> Result<FetchSummary> {
        let sources = store.list_enabled_sources().await?;
        let mut summary = FetchSummary::default();

        for source in sources {
            if source.parser_kind == ParserKind::Json {
                warn!(url = %source.url, "source uses the unsupported json parser, skipping");
                summary.skipped_sources += 1;
                continue;
            }

            match self.fetch_source(store, source.id, &source.url, source.parser_kind).await {
                Ok(added) => {
                    info!(url = %source.url, added, "fetched source");
                    summary.fetched_sources += 1;
                    summary.new_candidates += added;
                }
                Err(e) => {
                    warn!(url = %source.url, error = %e, "failed to fetch source");
                    summary.failed_sources += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Fetch one source and upsert its candidates. Returns how many were new.
    async fn fetch_source(
        &self,
        store: &ProxyStore,
        source_id: i64,
        url: &str,
        kind: ParserKind,
    ) -> Result<usize> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            bail!("HTTP status: {}", response.status());
        }
        let body = response.text().await?;

        let candidates = ProxyParser::parse(kind, &body);
        let mut added = 0;
        for candidate in &candidates {
            if store.upsert_ignore(candidate, url).await? {
                added += 1;
            }
        }

        store.touch_source_fetch(source_id).await?;
        Ok(added)
    }
}
