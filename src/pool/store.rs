//! SQLite-backed store for proxy records and proxy sources
//!
//! Pure data access: every operation is a single statement, so writes are
//! atomic per record and concurrent readers never observe a partial
//! update. There are no cross-operation transactions.

use crate::pool::models::{ParserKind, Proxy, ProxyRecord, ProxySourceRecord};
use crate::Result;
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

const PROXY_COLUMNS: &str = "id, ip, port, protocol, username, password, working, \
     last_checked, success_count, fail_count, response_time, source";

const SOURCE_COLUMNS: &str = "id, url, parser_type, last_fetch, enabled";

/// Store owning the connection pool for both relations
#[derive(Debug, Clone)]
pub struct ProxyStore {
    pool: SqlitePool,
}

impl ProxyStore {
    /// Open (creating if missing) the database at `path` and ensure the schema
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proxies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL,
                port INTEGER NOT NULL,
                protocol TEXT NOT NULL,
                username TEXT,
                password TEXT,
                working INTEGER NOT NULL DEFAULT 0,
                last_checked TIMESTAMP,
                success_count INTEGER NOT NULL DEFAULT 0,
                fail_count INTEGER NOT NULL DEFAULT 0,
                response_time INTEGER,
                source TEXT NOT NULL,
                UNIQUE(ip, port, protocol)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proxy_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                parser_type TEXT NOT NULL,
                last_fetch TIMESTAMP,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a candidate unless its (ip, port, protocol) key already
    /// exists. Existing entries are left untouched. Returns whether a row
    /// was inserted.
    pub async fn upsert_ignore(&self, proxy: &Proxy, source: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO proxies (ip, port, protocol, username, password, source)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&proxy.host)
        .bind(proxy.port)
        .bind(&proxy.proxy_type)
        .bind(proxy.auth.as_ref().map(|auth| auth.username.clone()))
        .bind(proxy.auth.as_ref().map(|auth| auth.password.clone()))
        .bind(source)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a probe outcome: bumps the matching counter, stamps
    /// `last_checked` and sets the working flag and response time in one
    /// atomic statement.
    pub async fn update_health(
        &self,
        id: i64,
        working: bool,
        response_time_ms: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE proxies SET
                working = ?,
                last_checked = ?,
                success_count = success_count + CASE WHEN ? THEN 1 ELSE 0 END,
                fail_count = fail_count + CASE WHEN ? THEN 0 ELSE 1 END,
                response_time = ?
            WHERE id = ?
            "#,
        )
        .bind(working)
        .bind(Utc::now())
        .bind(working)
        .bind(working)
        .bind(response_time_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All proxies that should be probed this cycle: everything currently
    /// working (liveness decays) plus anything unchecked or stale beyond
    /// the recheck window.
    pub async fn list_due_for_check(&self, recheck_window: Duration) -> Result<Vec<ProxyRecord>> {
        let cutoff = Utc::now() - recheck_window;

        let records = sqlx::query_as::<_, ProxyRecord>(&format!(
            "SELECT {} FROM proxies WHERE working = 1 OR last_checked IS NULL OR last_checked < ?",
            PROXY_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Evict proxies that are both dead and past the failure threshold.
    /// Returns the number of rows removed.
    pub async fn delete_dead_beyond_threshold(&self, max_fail_count: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM proxies WHERE working = 0 AND fail_count > ?")
            .bind(max_fail_count)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Working proxies ordered fastest first (unknown latency last)
    pub async fn top_working(&self, limit: i64) -> Result<Vec<ProxyRecord>> {
        let records = sqlx::query_as::<_, ProxyRecord>(&format!(
            "SELECT {} FROM proxies WHERE working = 1 \
             ORDER BY response_time IS NULL, response_time ASC LIMIT ?",
            PROXY_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Fetch a single proxy by id
    pub async fn get(&self, id: i64) -> Result<Option<ProxyRecord>> {
        let record = sqlx::query_as::<_, ProxyRecord>(&format!(
            "SELECT {} FROM proxies WHERE id = ?",
            PROXY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn count_proxies(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proxies")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_working(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proxies WHERE working = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Register a source unless its URL is already known. Returns whether
    /// a row was inserted.
    pub async fn upsert_source_ignore(&self, url: &str, parser_kind: ParserKind) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO proxy_sources (url, parser_type) VALUES (?, ?)")
                .bind(url)
                .bind(parser_kind)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_enabled_sources(&self) -> Result<Vec<ProxySourceRecord>> {
        let sources = sqlx::query_as::<_, ProxySourceRecord>(&format!(
            "SELECT {} FROM proxy_sources WHERE enabled = 1",
            SOURCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sources)
    }

    pub async fn list_sources(&self) -> Result<Vec<ProxySourceRecord>> {
        let sources = sqlx::query_as::<_, ProxySourceRecord>(&format!(
            "SELECT {} FROM proxy_sources ORDER BY id",
            SOURCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sources)
    }

    /// Stamp a source's last successful fetch time
    pub async fn touch_source_fetch(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE proxy_sources SET last_fetch = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Disable a source by URL. Returns whether a source matched.
    pub async fn disable_source(&self, url: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE proxy_sources SET enabled = 0 WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
