use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

const HOUR: u64 = 3600;

/// Upstream operations the engine knows how to cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Home,
    Charts,
    Moods,
    MoodPlaylists,
    Artist,
    ArtistSongs,
    ArtistAlbums,
    Album,
    Song,
    Lyrics,
    WatchPlaylist,
    Playlist,
    PlaylistTracks,
    Search,
}

/// Static cache policy for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub operation: Operation,
    /// `None` means the operation is never cached.
    pub ttl: Option<Duration>,
    /// Whether the result differs by country/language.
    pub region_sensitive: bool,
}

impl OperationSpec {
    pub fn is_cached(&self) -> bool {
        self.ttl.is_some()
    }
}

impl Operation {
    pub const ALL: [Operation; 14] = [
        Operation::Home,
        Operation::Charts,
        Operation::Moods,
        Operation::MoodPlaylists,
        Operation::Artist,
        Operation::ArtistSongs,
        Operation::ArtistAlbums,
        Operation::Album,
        Operation::Song,
        Operation::Lyrics,
        Operation::WatchPlaylist,
        Operation::Playlist,
        Operation::PlaylistTracks,
        Operation::Search,
    ];

    /// Roots of every warming pass.
    pub const WARMING_ROOTS: [Operation; 3] = [Operation::Charts, Operation::Home, Operation::Moods];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Home => "home",
            Operation::Charts => "charts",
            Operation::Moods => "moods",
            Operation::MoodPlaylists => "moodPlaylists",
            Operation::Artist => "artist",
            Operation::ArtistSongs => "artistSongs",
            Operation::ArtistAlbums => "artistAlbums",
            Operation::Album => "album",
            Operation::Song => "song",
            Operation::Lyrics => "lyrics",
            Operation::WatchPlaylist => "watchPlaylist",
            Operation::Playlist => "playlist",
            Operation::PlaylistTracks => "playlistTracks",
            Operation::Search => "search",
        }
    }

    /// Cache policy for this operation.
    ///
    /// Slow-changing entities (albums, songs, mood categories) live for days;
    /// feeds that the upstream reshuffles daily live for 24h. Search and
    /// lyrics are driven by free user input and are never cached.
    pub fn spec(&self) -> OperationSpec {
        let (ttl_hours, region_sensitive) = match self {
            Operation::Home => (Some(24), true),
            Operation::Charts => (Some(24), true),
            Operation::Moods => (Some(72), true),
            Operation::MoodPlaylists => (Some(48), true),
            Operation::Artist => (Some(48), false),
            Operation::ArtistSongs => (Some(24), false),
            Operation::ArtistAlbums => (Some(48), false),
            Operation::Album => (Some(72), false),
            Operation::Song => (Some(72), false),
            Operation::Lyrics => (None, false),
            Operation::WatchPlaylist => (Some(24), false),
            Operation::Playlist => (Some(48), false),
            Operation::PlaylistTracks => (Some(24), false),
            Operation::Search => (None, true),
        };

        OperationSpec {
            operation: *self,
            ttl: ttl_hours.map(|h| Duration::from_secs(h * HOUR)),
            region_sensitive,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.spec().ttl
    }

    pub fn is_region_sensitive(&self) -> bool {
        self.spec().region_sensitive
    }

    pub fn is_cached(&self) -> bool {
        self.spec().is_cached()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown operation: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_and_lyrics_are_never_cached() {
        assert!(!Operation::Search.is_cached());
        assert!(!Operation::Lyrics.is_cached());
        for op in Operation::ALL {
            if op != Operation::Search && op != Operation::Lyrics {
                assert!(op.is_cached(), "{op} should be cached");
            }
        }
    }

    #[test]
    fn feeds_expire_faster_than_entities() {
        let day = Duration::from_secs(24 * HOUR);
        assert_eq!(Operation::Home.ttl(), Some(day));
        assert_eq!(Operation::Charts.ttl(), Some(day));
        assert!(Operation::Album.ttl().unwrap() > day);
        assert!(Operation::Moods.ttl().unwrap() >= Duration::from_secs(48 * HOUR));
    }

    #[test]
    fn names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("podcasts".parse::<Operation>().is_err());
    }
}
