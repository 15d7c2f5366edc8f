//! Portfolio identifier lookups against the reference table.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::db::DbPool;
use crate::error::Result;

#[async_trait]
pub trait PortfolioDirectory: Send + Sync {
    /// Display name for `portfolio_id`, or `None` when the identifier is not
    /// in the reference table (a NULL or empty name counts as absent).
    async fn portfolio_name(&self, portfolio_id: &str) -> Result<Option<String>>;
}

/// `index_identifier` lookups over a connection pool.
#[derive(Clone)]
pub struct PgPortfolioDirectory {
    pool: DbPool,
}

impl PgPortfolioDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PortfolioDirectory for PgPortfolioDirectory {
    async fn portfolio_name(&self, portfolio_id: &str) -> Result<Option<String>> {
        let name: Option<Option<String>> = sqlx::query_scalar(
            r#"
                SELECT name
                FROM index_identifier
                WHERE portfolio_id = $1
            "#,
        )
        .bind(portfolio_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(non_empty(name.flatten()))
    }
}

/// A fixed identifier-to-name table held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticPortfolioDirectory {
    names: HashMap<String, String>,
}

impl StaticPortfolioDirectory {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl PortfolioDirectory for StaticPortfolioDirectory {
    async fn portfolio_name(&self, portfolio_id: &str) -> Result<Option<String>> {
        Ok(non_empty(self.names.get(portfolio_id).cloned()))
    }
}

/// Memoises lookups for the duration of a run. The reference table is
/// treated as read-only while a run is in progress; negative results are
/// cached too.
pub struct CachedDirectory<D> {
    inner: D,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl<D> CachedDirectory<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn cached(&self, portfolio_id: &str) -> Option<Option<String>> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(portfolio_id).cloned())
    }

    fn remember(&self, portfolio_id: &str, name: Option<String>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(portfolio_id.to_string(), name);
        }
    }
}

#[async_trait]
impl<D: PortfolioDirectory> PortfolioDirectory for CachedDirectory<D> {
    async fn portfolio_name(&self, portfolio_id: &str) -> Result<Option<String>> {
        if let Some(hit) = self.cached(portfolio_id) {
            return Ok(hit);
        }

        let name = self.inner.portfolio_name(portfolio_id).await?;
        debug!(portfolio_id, found = name.is_some(), "Resolved portfolio identifier");
        self.remember(portfolio_id, name.clone());
        Ok(name)
    }
}

fn non_empty(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.trim().is_empty())
}
