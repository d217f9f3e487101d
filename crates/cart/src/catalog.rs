//! Cached catalog reads.
//!
//! The catalog itself is an external collaborator; the cart only needs
//! product snapshots to put on lines. This module wraps whatever source the
//! embedder provides in an explicit, injectable TTL cache - no module-level
//! global, so tests and multi-instance deployments (e.g. server-side
//! rendering) each get their own instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, instrument};

use copperleaf_core::ProductSnapshot;

/// Errors from catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No product with the requested handle.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The underlying source failed.
    #[error("Catalog source error: {0}")]
    Source(String),
}

/// The upstream catalog read service.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one product snapshot by its handle.
    async fn fetch_product(&self, handle: &str) -> Result<ProductSnapshot, CatalogError>;
}

/// Cache key for catalog entries.
fn cache_key(handle: &str) -> String {
    format!("product:{handle}")
}

/// Read-through TTL cache over a [`CatalogSource`].
///
/// Cheaply cloneable; all clones share one cache.
#[derive(Clone)]
pub struct CachedCatalog {
    inner: Arc<CachedCatalogInner>,
}

struct CachedCatalogInner {
    source: Arc<dyn CatalogSource>,
    cache: Cache<String, ProductSnapshot>,
}

impl CachedCatalog {
    /// Create a cache over `source` with the given TTL and capacity.
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>, ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self {
            inner: Arc::new(CachedCatalogInner { source, cache }),
        }
    }

    /// Get a product snapshot, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is missing or the source fails;
    /// errors are not cached.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn product(&self, handle: &str) -> Result<ProductSnapshot, CatalogError> {
        let key = cache_key(handle);

        if let Some(product) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let product = self.inner.source.fetch_product(handle).await?;
        self.inner.cache.insert(key, product.clone()).await;
        Ok(product)
    }

    /// Invalidate a cached product.
    pub async fn invalidate(&self, handle: &str) {
        self.inner.cache.invalidate(&cache_key(handle)).await;
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}
