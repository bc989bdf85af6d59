use sha2::{Digest, Sha256};
use std::fmt;

use crate::operation::Operation;
use crate::region::RegionSpec;
use crate::sources::Params;

/// Storage key for one logical request: `<operation>:<sha256 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the cache key of a request.
///
/// Every field is length-prefixed before hashing so no concatenation of
/// different inputs can produce the same byte stream. Region only takes part
/// for region-sensitive operations.
pub fn derive(operation: Operation, region: &RegionSpec, params: &Params) -> CacheKey {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, operation.as_str());

    if operation.is_region_sensitive() {
        write_field(&mut hasher, region.country_code());
        write_field(&mut hasher, region.language());
    }

    hasher.update((params.len() as u64).to_be_bytes());
    for (name, value) in params {
        write_field(&mut hasher, name);
        write_field(&mut hasher, value);
    }

    CacheKey(format!("{}:{}", operation, hex::encode(hasher.finalize())))
}

fn write_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{RegionResolver, DEFAULT_REGIONS};
    use crate::sources::{params, PARAM_ID};
    use std::collections::HashSet;

    #[test]
    fn same_request_same_key() {
        let resolver = RegionResolver::default();
        let a = derive(Operation::Charts, &resolver.resolve("KR", None), &Params::new());
        let b = derive(Operation::Charts, &resolver.resolve(" kr ", Some("ko")), &Params::new());
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("charts:"));
        assert_eq!(a.as_str().len(), "charts:".len() + 64);
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let region = RegionResolver::default().default_region();
        let mut first = Params::new();
        first.insert("videoId".into(), "abc".into());
        first.insert("playlistId".into(), "RD123".into());
        let second = params([("playlistId", "RD123"), ("videoId", "abc")]);
        assert_eq!(
            derive(Operation::WatchPlaylist, &region, &first),
            derive(Operation::WatchPlaylist, &region, &second)
        );
    }

    #[test]
    fn region_only_counts_when_sensitive() {
        let resolver = RegionResolver::default();
        let id = params([(PARAM_ID, "MPREb_abc")]);
        assert_eq!(
            derive(Operation::Album, &resolver.resolve("KR", None), &id),
            derive(Operation::Album, &resolver.resolve("US", None), &id)
        );
        assert_ne!(
            derive(Operation::Home, &resolver.resolve("KR", None), &Params::new()),
            derive(Operation::Home, &resolver.resolve("US", None), &Params::new())
        );
        assert_ne!(
            derive(Operation::Home, &resolver.resolve("KR", Some("ko")), &Params::new()),
            derive(Operation::Home, &resolver.resolve("KR", Some("en")), &Params::new())
        );
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let region = RegionResolver::default().default_region();
        let a = params([("ab", "c")]);
        let b = params([("a", "bc")]);
        assert_ne!(
            derive(Operation::Playlist, &region, &a),
            derive(Operation::Playlist, &region, &b)
        );
    }

    #[test]
    fn no_collisions_across_synthetic_inputs() {
        let resolver = RegionResolver::default();
        let operations = [
            Operation::Home,
            Operation::Charts,
            Operation::MoodPlaylists,
            Operation::Album,
            Operation::Artist,
        ];
        let regions: Vec<_> = DEFAULT_REGIONS
            .iter()
            .take(20)
            .map(|(country, language)| resolver.resolve(country, Some(language)))
            .collect();

        let mut expected = HashSet::new();
        let mut keys = HashSet::new();
        for op in operations {
            for region in &regions {
                for id in 0..200 {
                    let p = params([(PARAM_ID, format!("id-{id}"))]);
                    let logical = if op.is_region_sensitive() {
                        format!("{op}|{region}|{id}")
                    } else {
                        format!("{op}|{id}")
                    };
                    expected.insert(logical);
                    keys.insert(derive(op, region, &p));
                }
            }
        }

        assert!(expected.len() >= 10_000, "only {} distinct inputs", expected.len());
        assert_eq!(keys.len(), expected.len());
    }
}
