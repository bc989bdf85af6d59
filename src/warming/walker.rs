use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::operation::Operation;
use crate::region::RegionSpec;
use crate::sources::{params, Document, Params, PARAM_ID, PARAM_MOOD, PARAM_PLAYLIST_ID};

static ALBUM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^MPREb_[A-Za-z0-9_-]+$").expect("valid album id pattern"));
static CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[A-Za-z0-9_-]+$").expect("valid channel id pattern"));

/// Chart section keys whose `items` are walked.
const CHART_SECTIONS: [&str; 4] = ["songs", "videos", "trending", "artists"];
/// Wrapper keys holding a list of shelves.
const SHELF_WRAPPERS: [&str; 2] = ["sections", "charts"];

/// An entity to prefetch during a warming pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WarmingTarget {
    pub operation: Operation,
    pub region: RegionSpec,
    pub params: Params,
    /// Distance from the root operation (roots are depth 0).
    pub depth: u8,
}

/// Finds the entities a fetched document refers to.
///
/// Pure: no I/O, no errors. Fields that do not have the expected shape are
/// skipped.
#[derive(Debug, Clone)]
pub struct DependencyWalker {
    max_artists: usize,
    max_mood_playlists: usize,
}

impl Default for DependencyWalker {
    fn default() -> Self {
        Self {
            max_artists: 40,
            max_mood_playlists: 5,
        }
    }
}

impl DependencyWalker {
    /// Targets referenced by `document`, a result of `kind` fetched at `depth`.
    ///
    /// Returned targets are one level deeper, deduplicated, and in document
    /// order.
    pub fn extract_references(
        &self,
        document: &Document,
        kind: Operation,
        region: &RegionSpec,
        depth: u8,
    ) -> Vec<WarmingTarget> {
        let mut refs = References::default();

        match kind {
            Operation::Home | Operation::Charts => self.walk_shelves(document, &mut refs),
            Operation::Moods => walk_mood_categories(document, &mut refs),
            Operation::MoodPlaylists => self.walk_mood_playlists(document, &mut refs),
            Operation::Artist => walk_artist(document, &mut refs),
            _ => {}
        }

        let targets: Vec<WarmingTarget> = refs
            .found
            .into_iter()
            .map(|(operation, params)| WarmingTarget {
                operation,
                region: region.clone(),
                params,
                depth: depth.saturating_add(1),
            })
            .collect();

        debug!("🔗 {} en {}: {} referencias", kind, region, targets.len());
        targets
    }

    fn walk_shelves(&self, document: &Document, refs: &mut References) {
        let mut items = Vec::new();
        collect_shelf_items(document, &mut items);

        let mut artists = 0usize;
        for item in items {
            let Some(item) = item.as_object() else {
                debug!("Elemento de estante ignorado: no es un objeto");
                continue;
            };

            if let Some(browse_id) = item.get("browseId").and_then(Value::as_str) {
                if ALBUM_ID.is_match(browse_id) {
                    refs.push(Operation::Album, params([(PARAM_ID, browse_id)]));
                }
            }

            if let Some(playlist_id) = item.get("playlistId").and_then(Value::as_str) {
                if !playlist_id.is_empty() {
                    refs.push(
                        Operation::WatchPlaylist,
                        params([(PARAM_PLAYLIST_ID, playlist_id)]),
                    );
                }
            }

            if artists < self.max_artists {
                if let Some(channel) = artist_channel(item) {
                    if refs.push(Operation::Artist, params([(PARAM_ID, channel)])) {
                        artists += 1;
                    }
                }
            }
        }
    }

    fn walk_mood_playlists(&self, document: &Document, refs: &mut References) {
        let Some(playlists) = document.as_array() else {
            debug!("Playlists de mood con forma inesperada");
            return;
        };

        playlists
            .iter()
            .filter_map(|p| p.get("playlistId").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .take(self.max_mood_playlists)
            .for_each(|id| {
                refs.push(Operation::WatchPlaylist, params([(PARAM_PLAYLIST_ID, id)]));
            });
    }
}

/// Ordered, deduplicated set of (operation, params) pairs.
#[derive(Default)]
struct References {
    seen: HashSet<(Operation, Params)>,
    found: Vec<(Operation, Params)>,
}

impl References {
    /// Returns `false` if the reference was already recorded.
    fn push(&mut self, operation: Operation, params: Params) -> bool {
        if self.seen.insert((operation, params.clone())) {
            self.found.push((operation, params));
            true
        } else {
            false
        }
    }
}

/// Flattens the shelf layouts returned by `home` and `charts` into items.
fn collect_shelf_items<'a>(document: &'a Value, items: &mut Vec<&'a Value>) {
    match document {
        Value::Array(shelves) => {
            for shelf in shelves {
                match shelf.get("contents") {
                    Some(Value::Array(contents)) => items.extend(contents),
                    Some(_) => debug!("Campo 'contents' ignorado: no es una lista"),
                    None if shelf.is_object() => items.push(shelf),
                    None => {}
                }
            }
        }
        Value::Object(map) => {
            for wrapper in SHELF_WRAPPERS {
                if let Some(inner) = map.get(wrapper) {
                    collect_shelf_items(inner, items);
                }
            }
            for section in CHART_SECTIONS {
                match map.get(section) {
                    Some(Value::Object(body)) => match body.get("items") {
                        Some(Value::Array(entries)) => items.extend(entries),
                        _ => debug!("Sección '{}' sin lista de items", section),
                    },
                    Some(Value::Array(entries)) => items.extend(entries),
                    Some(_) => debug!("Sección '{}' ignorada: forma inesperada", section),
                    None => {}
                }
            }
        }
        _ => debug!("Documento de estantes con forma inesperada"),
    }
}

/// Channel id of the artist an item refers to: the item itself when it is
/// an artist, otherwise its first credited artist.
fn artist_channel(item: &serde_json::Map<String, Value>) -> Option<&str> {
    if let Some(browse_id) = item.get("browseId").and_then(Value::as_str) {
        if CHANNEL_ID.is_match(browse_id) {
            return Some(browse_id);
        }
    }

    item.get("artists")
        .and_then(Value::as_array)
        .and_then(|artists| artists.first())
        .and_then(|artist| artist.get("id"))
        .and_then(Value::as_str)
        .filter(|id| CHANNEL_ID.is_match(id))
}

fn walk_mood_categories(document: &Document, refs: &mut References) {
    let Some(sections) = document.as_object() else {
        debug!("Categorías de mood con forma inesperada");
        return;
    };

    for (section, categories) in sections {
        let Some(categories) = categories.as_array() else {
            debug!("Sección de mood '{}' ignorada", section);
            continue;
        };
        for category in categories {
            match category.get("params").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => {
                    refs.push(Operation::MoodPlaylists, params([(PARAM_MOOD, token)]));
                }
                _ => debug!("Categoría sin 'params' en '{}'", section),
            }
        }
    }
}

fn walk_artist(document: &Document, refs: &mut References) {
    let Some(channel) = document
        .get("channelId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    else {
        debug!("Artista sin channelId");
        return;
    };

    if document.get("albums").is_some_and(|v| !v.is_null()) {
        refs.push(Operation::ArtistAlbums, params([(PARAM_ID, channel)]));
    }
    if document.get("songs").is_some_and(|v| !v.is_null()) {
        refs.push(Operation::ArtistSongs, params([(PARAM_ID, channel)]));
    }
}
