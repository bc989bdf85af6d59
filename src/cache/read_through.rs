use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{derive, CacheKey, CacheStore};
use crate::error::{EngineError, UpstreamError};
use crate::operation::Operation;
use crate::region::{RegionResolver, RegionSpec};
use crate::retry::RetryExecutor;
use crate::sources::{Document, Params, UpstreamClient};

/// Read-through cache in front of the upstream client.
///
/// A miss fetches through the [`RetryExecutor`]; a regional failure is
/// retried once against the default region and the substitute is cached
/// under the original key. Concurrent misses on the same key may each fetch
/// and write (last write wins).
pub struct ReadThroughCache {
    store: Arc<CacheStore>,
    upstream: Arc<dyn UpstreamClient>,
    resolver: RegionResolver,
    retry: RetryExecutor,
}

impl ReadThroughCache {
    pub fn new(
        store: Arc<CacheStore>,
        upstream: Arc<dyn UpstreamClient>,
        resolver: RegionResolver,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            store,
            upstream,
            resolver,
            retry,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn resolver(&self) -> &RegionResolver {
        &self.resolver
    }

    /// Region an operation is fetched and keyed with.
    ///
    /// Region-insensitive operations always use the default region, so a
    /// region-free key never holds content fetched for some other locale.
    fn effective_region(&self, operation: Operation, region: &RegionSpec) -> RegionSpec {
        if operation.is_region_sensitive() {
            region.clone()
        } else {
            self.resolver.default_region()
        }
    }

    pub fn key_for(&self, operation: Operation, region: &RegionSpec, params: &Params) -> CacheKey {
        derive(operation, &self.effective_region(operation, region), params)
    }

    /// Whether a live entry exists for the request. Never-cached operations
    /// are never considered cached.
    pub async fn is_cached(&self, operation: Operation, region: &RegionSpec, params: &Params) -> bool {
        operation.is_cached()
            && self
                .store
                .exists(self.key_for(operation, region, params).as_str())
                .await
    }

    /// Resolves raw request input, then reads through the cache.
    pub async fn get_for(
        &self,
        operation: Operation,
        country: &str,
        language: Option<&str>,
        params: &Params,
    ) -> Result<Document, EngineError> {
        let region = self.resolver.resolve(country, language);
        self.get(operation, &region, params).await
    }

    /// Returns the document for a request, from cache when possible.
    ///
    /// Dropping the returned future cancels the upstream call and any
    /// pending backoff.
    pub async fn get(
        &self,
        operation: Operation,
        region: &RegionSpec,
        params: &Params,
    ) -> Result<Document, EngineError> {
        let region = self.effective_region(operation, region);

        if operation.is_cached() {
            let key = derive(operation, &region, params);
            if let Some(document) = self.store.get(key.as_str()).await {
                return Ok(document);
            }
        }

        self.load(operation, &region, params).await
    }

    /// Fetches from upstream without reading the cache and stores the result.
    pub async fn refresh(
        &self,
        operation: Operation,
        region: &RegionSpec,
        params: &Params,
    ) -> Result<Document, EngineError> {
        let region = self.effective_region(operation, region);
        self.load(operation, &region, params).await
    }

    /// Upstream fetch with regional fallback; `region` is already effective.
    async fn load(
        &self,
        operation: Operation,
        region: &RegionSpec,
        params: &Params,
    ) -> Result<Document, EngineError> {
        let spec = operation.spec();

        let result = match self.fetch(operation, region, params).await {
            Ok(document) => Ok(document),
            Err(e) if spec.region_sensitive && !self.resolver.is_default(region) => {
                let fallback = self.resolver.default_region();
                warn!(
                    "🔄 {} falló para {} ({}), usando región por defecto {}",
                    operation, region, e, fallback
                );
                let substituted = self.fetch(operation, &fallback, params).await;
                if substituted.is_ok() {
                    info!("✅ {} para {} servido con contenido de {}", operation, region, fallback);
                }
                substituted
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(document) => {
                if let Some(ttl) = spec.ttl {
                    let key = derive(operation, region, params);
                    self.store.set(key.as_str(), &document, ttl).await;
                }
                Ok(document)
            }
            Err(e) => {
                error!("❌ Upstream no disponible para {} {}: {}", operation, region, e);
                Err(EngineError::UpstreamUnavailable {
                    operation,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn fetch(
        &self,
        operation: Operation,
        region: &RegionSpec,
        params: &Params,
    ) -> Result<Document, UpstreamError> {
        debug!("🌐 Consultando upstream: {} {} {:?}", operation, region, params);
        let label = format!("{operation} {region}");
        self.retry
            .execute(&label, || self.upstream.fetch(operation, region, params))
            .await
    }
}
