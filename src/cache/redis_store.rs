//! Redis-backed cache backend.
//!
//! Values are stored as a JSON envelope carrying the document and its
//! absolute expiry. Redis `EX` handles eviction; the envelope expiry is
//! rechecked on read so both backends agree on `now >= expires_at`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::CacheBackend;
use crate::error::CacheError;
use crate::sources::Document;

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection string (redis://localhost:6379)
    pub redis_url: String,
    /// Prefix for every key written by this process.
    pub key_prefix: String,
    /// Connection timeout.
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "regional-cache".to_string(),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: Document,
    expires_at: DateTime<Utc>,
}

impl Envelope {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Networked, persistent backend.
#[derive(Clone)]
pub struct RedisBackend {
    client: Arc<Client>,
    config: Arc<RedisConfig>,
    connection: Arc<RwLock<Option<redis::aio::MultiplexedConnection>>>,
}

impl Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection_status = match self.connection.try_read() {
            Ok(conn) if conn.is_some() => "connected",
            Ok(_) => "no_connection",
            Err(_) => "lock_error",
        };

        f.debug_struct("RedisBackend")
            .field("config", &self.config)
            .field("connected", &connection_status)
            .finish()
    }
}

impl RedisBackend {
    /// Creates the backend. No connection is opened until first use.
    pub fn new(config: RedisConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.redis_url.as_str())?;

        Ok(Self {
            client: Arc::new(client),
            config: Arc::new(config),
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Get or create the multiplexed connection.
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        if slot.is_none() {
            let connect = self.client.get_multiplexed_async_connection();
            let conn = tokio::time::timeout(self.config.connection_timeout, connect)
                .await
                .map_err(|_| {
                    CacheError::Connection(format!(
                        "timed out after {:?}",
                        self.config.connection_timeout
                    ))
                })??;
            *slot = Some(conn);
        }

        slot.as_ref()
            .cloned()
            .ok_or_else(|| CacheError::Connection("Failed to get connection".into()))
    }

    /// Drops a broken connection so the next call reconnects.
    async fn reset_on_error<T>(&self, result: redis::RedisResult<T>) -> Result<T, CacheError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() || e.is_timeout() {
                    *self.connection.write().await = None;
                }
                Err(CacheError::Redis(e))
            }
        }
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Document>, CacheError> {
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = self.reset_on_error(conn.get(self.build_key(key)).await).await?;

        match raw {
            Some(json_str) => {
                let envelope: Envelope = serde_json::from_str(&json_str)?;
                if envelope.is_expired(Utc::now()) {
                    Ok(None)
                } else {
                    Ok(Some(envelope.value))
                }
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Document, ttl: Duration) -> Result<(), CacheError> {
        let ttl_secs = ttl.as_secs().max(1);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| CacheError::Unavailable(format!("invalid ttl {ttl:?}: {e}")))?;
        let json_str = serde_json::to_string(&Envelope {
            value: value.clone(),
            expires_at,
        })?;

        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<()> =
            conn.set_ex(self.build_key(key), json_str, ttl_secs).await;
        self.reset_on_error(result).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.get_connection().await?;
        self.reset_on_error(conn.exists(self.build_key(key)).await).await
    }

    async fn count(&self) -> Result<usize, CacheError> {
        let mut conn = self.get_connection().await?;
        let pattern = format!("{}:*", self.config.key_prefix);
        let mut cursor: u64 = 0;
        let mut total = 0usize;

        loop {
            let result: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await;
            let (next, keys) = self.reset_on_error(result).await?;
            total += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(total)
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        // Redis expires keys on its own.
        Ok(0)
    }

    async fn close(&self) -> Result<(), CacheError> {
        *self.connection.write().await = None;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_prefixed() {
        let backend = RedisBackend::new(RedisConfig::default()).unwrap();
        assert_eq!(backend.build_key("charts:ab12"), "regional-cache:charts:ab12");
    }

    #[test]
    fn envelope_expiry_is_inclusive() {
        let now = Utc::now();
        let envelope = Envelope {
            value: json!({"songs": {"items": []}}),
            expires_at: now,
        };
        assert!(envelope.is_expired(now));
        assert!(!envelope.is_expired(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn envelope_round_trips_document_unchanged() {
        let doc = json!([{"title": "Top songs", "contents": [{"videoId": "x", "rank": 1}]}]);
        let raw = serde_json::to_string(&Envelope {
            value: doc.clone(),
            expires_at: Utc::now(),
        })
        .unwrap();
        let back: Envelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.value, doc);
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = RedisBackend::new(RedisConfig {
            redis_url: "definitely not redis".into(),
            ..RedisConfig::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error_not_a_panic() {
        let backend = RedisBackend::new(RedisConfig {
            redis_url: "redis://127.0.0.1:1".into(),
            connection_timeout: Duration::from_millis(200),
            ..RedisConfig::default()
        })
        .unwrap();

        assert!(backend.get("k").await.is_err());
        assert!(backend.exists("k").await.is_err());
    }
}
