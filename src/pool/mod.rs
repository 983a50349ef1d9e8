//! Proxy pool module
//!
//! This module provides functionality for:
//! - Persisting proxy records and list sources in SQLite
//! - Fetching and parsing candidate proxies from the registered sources
//! - Probing proxies for liveness with bounded concurrency
//! - Driving fetch and check cycles on a supervised background loop
//! - Serving a latency-biased random rotation to callers

pub mod checker;
pub mod fetcher;
pub mod manager;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod selector;
pub mod store;

pub use checker::{CheckSummary, CheckerConfig, HealthChecker};
pub use fetcher::{FetchSummary, FetcherConfig, SourceFetcher};
pub use manager::{PoolConfig, PoolStatus, ProxyPool};
pub use models::{
    ParserKind, ProbeOutcome, Proxy, ProxyAuth, ProxyRecord, ProxySourceRecord, ProxyType,
};
pub use parser::ProxyParser;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};
pub use selector::ProxySelector;
pub use store::ProxyStore;
