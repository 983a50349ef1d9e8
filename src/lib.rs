//! Proxy Pool - self-refreshing proxy pool
//!
//! Discovers candidate proxies from public list sources, validates them
//! with live probes, persists their health metadata and serves a
//! latency-biased rotation to callers. Proxies silently die and sources
//! go stale, so a background loop keeps re-fetching and re-checking the
//! pool; an empty pool is a valid state callers must expect.

pub mod pool;

pub use pool::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
