//! # Cache Module
//!
//! Key/value storage with per-entry expiry for upstream documents.
//!
//! The store is split in two layers:
//!
//! - [`CacheBackend`]: the raw storage. Every method returns a
//!   [`CacheError`] on failure. Two backends ship with the crate:
//!   [`MemoryBackend`] (bounded in-process map) and [`RedisBackend`]
//!   (networked, persistent).
//! - [`CacheStore`]: the boundary the rest of the engine talks to. Backend
//!   faults are logged and swallowed here, so an outage degrades to
//!   "always miss" instead of failing requests.
//!
//! Expiry is lazy: an entry is absent once `now >= expires_at`, checked at
//! read time. The memory backend also evicts by size and can be swept.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use regional_cache::cache::{CacheStore, MemoryBackend};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let store = CacheStore::new(Arc::new(MemoryBackend::new(1_000)));
//! store.set("charts:abc", &json!({"songs": {"items": []}}), Duration::from_secs(60)).await;
//!
//! if let Some(doc) = store.get("charts:abc").await {
//!     println!("cached: {doc}");
//! }
//! # }
//! ```

pub mod key;
pub mod memory;
pub mod read_through;
pub mod redis_store;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::sources::Document;

pub use key::{derive, CacheKey};
pub use memory::MemoryBackend;
pub use read_through::ReadThroughCache;
pub use redis_store::{RedisBackend, RedisConfig};

/// Raw storage behind a [`CacheStore`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the live value for `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Document>, CacheError>;

    /// Upserts `value` so that it expires `ttl` from now.
    async fn set(&self, key: &str, value: &Document, ttl: Duration) -> Result<(), CacheError>;

    /// Whether a live entry exists, without deserializing it.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize, CacheError>;

    /// Drops expired entries, returning how many were removed.
    async fn sweep_expired(&self) -> Result<usize, CacheError>;

    /// Flushes and releases backend resources.
    async fn close(&self) -> Result<(), CacheError>;

    /// Whether entries survive a process restart.
    fn is_persistent(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Health of the backend as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendHealth {
    Healthy,
    Unavailable,
}

/// Snapshot returned by [`CacheStore::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub backend: &'static str,
    pub entries: usize,
    pub backend_health: BackendHealth,
    pub hits: u64,
    pub misses: u64,
    pub backend_errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    backend_errors: AtomicU64,
}

/// Cache store shared by the read-through path and the warming scheduler.
///
/// Safe for concurrent use from any task. Every write is a plain upsert;
/// no operation reads and then writes the same entry.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    counters: Counters,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        info!("🗄️ Caché inicializado con backend {}", backend.name());
        Self {
            backend,
            counters: Counters::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    pub async fn get(&self, key: &str) -> Option<Document> {
        match self.backend.get(key).await {
            Ok(Some(value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ Cache hit: {}", key);
                Some(value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!("❌ Cache miss: {}", key);
                None
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.backend_fault("get", key, &e);
                None
            }
        }
    }

    /// Best effort: a failed write is logged and dropped.
    pub async fn set(&self, key: &str, value: &Document, ttl: Duration) {
        match self.backend.set(key, value, ttl).await {
            Ok(()) => debug!("💾 Almacenado en caché: {} (ttl {:?})", key, ttl),
            Err(e) => self.backend_fault("set", key, &e),
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.backend.exists(key).await.unwrap_or_else(|e| {
            self.backend_fault("exists", key, &e);
            false
        })
    }

    pub async fn stats(&self) -> CacheStats {
        let (entries, backend_health) = match self.backend.count().await {
            Ok(count) => (count, BackendHealth::Healthy),
            Err(e) => {
                self.backend_fault("count", "*", &e);
                (0, BackendHealth::Unavailable)
            }
        };

        CacheStats {
            backend: self.backend.name(),
            entries,
            backend_health,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            backend_errors: self.counters.backend_errors.load(Ordering::Relaxed),
        }
    }

    /// Removes expired entries; logs how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        match self.backend.sweep_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    info!("🧹 Cache cleanup: removed {} expired entries", removed);
                }
                removed
            }
            Err(e) => {
                self.backend_fault("sweep", "*", &e);
                0
            }
        }
    }

    pub async fn close(&self) {
        if let Err(e) = self.backend.close().await {
            self.backend_fault("close", "*", &e);
        } else {
            info!("🗄️ Backend {} cerrado", self.backend.name());
        }
    }

    fn backend_fault(&self, op: &str, key: &str, error: &CacheError) {
        self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
        warn!("⚠️ Error de backend {} en {} ({}): {}", self.backend.name(), op, key, error);
    }
}
