use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::CacheBackend;
use crate::error::CacheError;
use crate::sources::Document;

/// Cache entry con expiración absoluta
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Document,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Document, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Bounded in-process backend.
///
/// When an insert pushes the map past `max_entries`, expired entries are
/// dropped first, then the entries closest to expiry until the map is back
/// at 90% of capacity, so the sort runs once per batch rather than per insert.
#[derive(Debug)]
pub struct MemoryBackend {
    data: DashMap<String, CacheEntry>,
    max_entries: usize,
}

impl MemoryBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            data: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }
        removed
    }

    fn enforce_capacity(&self) {
        if self.data.len() <= self.max_entries {
            return;
        }

        self.cleanup_expired();
        if self.data.len() <= self.max_entries {
            return;
        }
        let low_water = self.max_entries - self.max_entries / 10;
        let overflow = self.data.len().saturating_sub(low_water);

        let mut entries: Vec<(String, Instant)> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().expires_at))
            .collect();
        entries.sort_by_key(|(_, expires_at)| *expires_at);

        for (key, _) in entries.into_iter().take(overflow) {
            self.data.remove(&key);
        }
        debug!("Evictadas {} entradas por límite de capacidad", overflow);
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Document>, CacheError> {
        if let Some(entry) = self.data.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.data.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Document, ttl: Duration) -> Result<(), CacheError> {
        self.data
            .insert(key.to_string(), CacheEntry::new(value.clone(), ttl));
        self.enforce_capacity();
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .data
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn count(&self) -> Result<usize, CacheError> {
        Ok(self.data.len())
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        Ok(self.cleanup_expired())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.data.clear();
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_at_ttl() {
        let backend = MemoryBackend::new(10);
        backend
            .set("home:kr", &json!([{"title": "Quick picks"}]), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(backend.exists("home:kr").await.unwrap());
        assert_eq!(
            backend.get("home:kr").await.unwrap(),
            Some(json!([{"title": "Quick picks"}]))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!backend.exists("home:kr").await.unwrap());
        assert_eq!(backend.get("home:kr").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upsert_resets_expiry() {
        let backend = MemoryBackend::new(10);
        backend.set("k", &json!(1), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        backend.set("k", &json!(2), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(backend.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_soonest_to_expire_past_capacity() {
        let backend = MemoryBackend::new(2);
        backend.set("short", &json!("s"), Duration::from_secs(10)).await.unwrap();
        backend.set("long", &json!("l"), Duration::from_secs(1000)).await.unwrap();
        backend.set("mid", &json!("m"), Duration::from_secs(100)).await.unwrap();

        assert_eq!(backend.len(), 2);
        assert!(!backend.exists("short").await.unwrap());
        assert!(backend.exists("long").await.unwrap());
        assert!(backend.exists("mid").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_evicts_a_batch_down_to_low_water() {
        let backend = MemoryBackend::new(100);
        for i in 0..100u64 {
            backend
                .set(&format!("k{i}"), &json!(i), Duration::from_secs(1000 + i))
                .await
                .unwrap();
        }
        assert_eq!(backend.len(), 100);

        backend.set("newest", &json!("n"), Duration::from_secs(5000)).await.unwrap();
        assert_eq!(backend.len(), 90);
        assert!(backend.exists("newest").await.unwrap());
        assert!(!backend.exists("k10").await.unwrap());
        assert!(backend.exists("k11").await.unwrap());

        // Room was made for the next inserts without another eviction.
        for i in 0..10u64 {
            backend.set(&format!("extra{i}"), &json!(i), Duration::from_secs(10)).await.unwrap();
        }
        assert_eq!(backend.len(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let backend = MemoryBackend::new(10);
        backend.set("a", &json!(null), Duration::from_secs(5)).await.unwrap();
        backend.set("b", &json!(null), Duration::from_secs(50)).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(backend.sweep_expired().await.unwrap(), 1);
        assert_eq!(backend.count().await.unwrap(), 1);
    }
}
