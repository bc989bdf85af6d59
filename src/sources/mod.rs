pub mod http;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::UpstreamError;
use crate::operation::Operation;
use crate::region::RegionSpec;

pub use http::{HttpUpstreamClient, UpstreamConfig};

/// Upstream documents are kept exactly as received.
pub type Document = serde_json::Value;

/// Operation parameters. Ordered so that keys never depend on call-site order.
pub type Params = BTreeMap<String, String>;

/// Entity identifier (artist channel, album browse id, video id, playlist id).
pub const PARAM_ID: &str = "id";
/// Mood category token returned by the `moods` operation.
pub const PARAM_MOOD: &str = "params";
pub const PARAM_VIDEO_ID: &str = "videoId";
pub const PARAM_PLAYLIST_ID: &str = "playlistId";
pub const PARAM_QUERY: &str = "q";
pub const PARAM_FILTER: &str = "filter";
pub const PARAM_LIMIT: &str = "limit";

/// Builds a [`Params`] map from key/value pairs.
pub fn params<K, V, I>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Client for the upstream content API.
///
/// Implementations may be slow, rate limited, or return empty documents.
/// An empty document is a valid answer and must be returned as `Ok`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(
        &self,
        operation: Operation,
        region: &RegionSpec,
        params: &Params,
    ) -> Result<Document, UpstreamError>;

    /// Nombre del cliente para logs
    fn source_name(&self) -> &'static str {
        "upstream"
    }
}
