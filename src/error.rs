//! Error types for the cache engine.
//!
//! Only [`EngineError`] ever reaches a caller of the read-through cache.
//! [`CacheError`] is swallowed at the [`CacheStore`](crate::cache::CacheStore)
//! boundary and [`UpstreamError`] is consumed by retries and the regional
//! fallback before being folded into [`EngineError::UpstreamUnavailable`].

use std::time::Duration;
use thiserror::Error;

use crate::operation::Operation;

/// Failures reported by an [`UpstreamClient`](crate::sources::UpstreamClient).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// Network failure, rate limiting or a 5xx response.
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// The upstream rejected the request (unknown id, bad params).
    #[error("permanent upstream error: {0}")]
    Permanent(String),

    /// The upstream answered with something that is not a JSON document.
    #[error("malformed upstream document: {0}")]
    Malformed(String),

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    /// Whether a caller could expect a different outcome on a later attempt.
    ///
    /// Retries currently ignore this and treat every failure the same way.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                Self::Permanent(err.to_string())
            }
            _ => Self::Transient(err.to_string()),
        }
    }
}

/// Cache backend errors. Never propagated past the cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the read-through cache.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Every attempt, including the default-region fallback, failed.
    #[error("upstream unavailable for {operation}: {message}")]
    UpstreamUnavailable {
        operation: Operation,
        message: String,
    },
}

impl EngineError {
    /// HTTP status the route layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UpstreamUnavailable { .. } => 503,
        }
    }
}
