use crate::cache::TtlCache;
use crate::error::DashboardError;
use crate::table::Table;
use chrono::Duration;
use compact_str::CompactString;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Where rows come from. Every call returns the whole table.
pub trait RowSource: Send + Sync {
    fn fetch_all(&self) -> impl Future<Output = Result<Arc<Table>, DashboardError>> + Send;
}

/// PostgREST endpoint of a hosted table store.
pub struct SupabaseSource {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseSource {
    pub fn new(client: Client, base_url: String, api_key: String, table: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            table,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table)
    }
}

impl RowSource for SupabaseSource {
    async fn fetch_all(&self) -> Result<Arc<Table>, DashboardError> {
        let unavailable = |e: String| DashboardError::SourceUnavailable(e);

        let resp = self
            .client
            .get(self.endpoint())
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .query(&[("select", "*")])
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {} from {}", status, self.table)));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| unavailable(e.to_string()))?;
        let table = Table::from_json(body).map_err(unavailable)?;
        info!(table = %self.table, rows = table.len(), "Fetched rows");
        Ok(Arc::new(table))
    }
}

/// Keeps the last fetched table for `ttl`. Concurrent misses share one fetch.
pub struct CachedSource<S> {
    inner: S,
    key: CompactString,
    cache: Arc<TtlCache<CompactString, Arc<Table>>>,
    ttl: Duration,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl<S: RowSource> CachedSource<S> {
    pub fn new(
        inner: S,
        key: &str,
        cache: Arc<TtlCache<CompactString, Arc<Table>>>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            key: CompactString::from(key),
            cache,
            ttl,
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }
}

impl<S: RowSource> RowSource for CachedSource<S> {
    async fn fetch_all(&self) -> Result<Arc<Table>, DashboardError> {
        if let Some(table) = self.cache.get(&self.key) {
            return Ok(table);
        }
        let _guard = self.fetch_lock.lock().await;
        if let Some(table) = self.cache.get(&self.key) {
            return Ok(table);
        }
        match self.inner.fetch_all().await {
            Ok(table) => {
                self.cache.put(self.key.clone(), table.clone(), self.ttl);
                Ok(table)
            }
            Err(e) => {
                warn!(error = %e, "Row fetch failed");
                Err(e)
            }
        }
    }
}
