//! Regional content cache and prefetch engine.
//!
//! Requests for music metadata (home feed, charts, moods, artists, albums,
//! playlists) go through a [`cache::ReadThroughCache`] keyed by operation,
//! region and parameters. A [`warming::WarmingScheduler`] keeps the cache
//! warm for a configured list of regions in the background.

pub mod cache;
pub mod config;
pub mod error;
pub mod operation;
pub mod region;
pub mod retry;
pub mod sources;
pub mod warming;

#[cfg(test)]
mod testing;
