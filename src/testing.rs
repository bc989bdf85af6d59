//! Test doubles shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cache::{CacheStore, MemoryBackend, ReadThroughCache};
use crate::error::UpstreamError;
use crate::operation::Operation;
use crate::region::{RegionResolver, RegionSpec};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::sources::{Document, Params, UpstreamClient};

type Responder =
    dyn Fn(Operation, &RegionSpec, &Params) -> Result<Document, UpstreamError> + Send + Sync;

/// Upstream that answers from a closure and records every call.
pub(crate) struct StubUpstream {
    calls: AtomicUsize,
    log: Mutex<Vec<(Operation, String, Params)>>,
    responder: Box<Responder>,
}

impl StubUpstream {
    pub(crate) fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(Operation, &RegionSpec, &Params) -> Result<Document, UpstreamError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, operation: Operation) -> usize {
        self.log.lock().iter().filter(|(op, _, _)| *op == operation).count()
    }

    pub(crate) fn log(&self) -> Vec<(Operation, String, Params)> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl UpstreamClient for StubUpstream {
    async fn fetch(
        &self,
        operation: Operation,
        region: &RegionSpec,
        params: &Params,
    ) -> Result<Document, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .push((operation, region.to_string(), params.clone()));
        (self.responder)(operation, region, params)
    }
}

/// Retry policy without waiting, for tests that do not exercise backoff.
pub(crate) fn instant_retry() -> RetryExecutor {
    RetryExecutor::new(RetryConfig {
        max_jitter: std::time::Duration::ZERO,
        base_secs: 0,
        ..RetryConfig::default()
    })
}

pub(crate) fn memory_cache(upstream: Arc<dyn UpstreamClient>) -> Arc<ReadThroughCache> {
    let store = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new(10_000))));
    Arc::new(ReadThroughCache::new(
        store,
        upstream,
        RegionResolver::default(),
        instant_retry(),
    ))
}
