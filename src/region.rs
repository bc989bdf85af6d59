//! Region and language normalization.
//!
//! Every upstream call carries a [`RegionSpec`] produced here. Raw request
//! input is never forwarded: countries that are not two ASCII letters fall
//! back to the default country and unsupported languages fall back to the
//! default language.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Country code meaning "no regional restriction".
pub const GLOBAL_COUNTRY: &str = "ZZ";

/// Languages the upstream accepts.
pub const SUPPORTED_LANGUAGES: [&str; 17] = [
    "ko", "hi", "it", "de", "tr", "en", "pt", "cs", "zh_CN", "ja", "es", "ru", "fr", "nl", "ar",
    "ur", "zh_TW",
];

/// Countries with official charts, with the language their content is
/// requested in. Countries whose own language is unsupported use `en`.
pub const DEFAULT_REGIONS: [(&str, &str); 62] = [
    ("ZZ", "en"),
    ("AR", "es"),
    ("AT", "de"),
    ("AU", "en"),
    ("AE", "ar"),
    ("BE", "fr"),
    ("BO", "es"),
    ("BR", "pt"),
    ("CA", "en"),
    ("CH", "de"),
    ("CL", "es"),
    ("CO", "es"),
    ("CR", "es"),
    ("CZ", "cs"),
    ("DE", "de"),
    ("DK", "en"),
    ("DO", "es"),
    ("EC", "es"),
    ("EE", "en"),
    ("EG", "ar"),
    ("ES", "es"),
    ("FI", "en"),
    ("FR", "fr"),
    ("GB", "en"),
    ("GT", "es"),
    ("HN", "es"),
    ("HU", "en"),
    ("ID", "en"),
    ("IE", "en"),
    ("IL", "en"),
    ("IN", "hi"),
    ("IS", "en"),
    ("IT", "it"),
    ("JP", "ja"),
    ("KE", "en"),
    ("KR", "ko"),
    ("LU", "fr"),
    ("MX", "es"),
    ("NG", "en"),
    ("NI", "es"),
    ("NL", "nl"),
    ("NO", "en"),
    ("NZ", "en"),
    ("PA", "es"),
    ("PE", "es"),
    ("PL", "en"),
    ("PT", "pt"),
    ("PY", "es"),
    ("RO", "en"),
    ("RS", "en"),
    ("RU", "ru"),
    ("SA", "ar"),
    ("SE", "en"),
    ("SV", "es"),
    ("TR", "tr"),
    ("TZ", "en"),
    ("UA", "en"),
    ("UG", "en"),
    ("US", "en"),
    ("UY", "es"),
    ("ZA", "en"),
    ("ZW", "en"),
];

/// Normalized region sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionSpec {
    /// `None` for global requests.
    country: Option<String>,
    language: String,
}

impl RegionSpec {
    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_global(&self) -> bool {
        self.country.is_none()
    }

    /// Country code used in cache keys and logs (`ZZ` for global).
    pub fn country_code(&self) -> &str {
        self.country.as_deref().unwrap_or(GLOBAL_COUNTRY)
    }
}

impl fmt::Display for RegionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.country_code(), self.language)
    }
}

/// A warming region: a country plus the language it is requested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub country: String,
    pub language: Option<String>,
}

impl Region {
    pub fn new(country: &str, language: Option<&str>) -> Self {
        Self {
            country: country.to_string(),
            language: language.map(str::to_string),
        }
    }

    /// Parses a comma separated list of `CC` or `CC:lang` tokens.
    pub fn parse_list(raw: &str) -> Vec<Region> {
        raw.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| match token.split_once(':') {
                Some((country, language)) => Region::new(country.trim(), Some(language.trim())),
                None => Region::new(token, None),
            })
            .collect()
    }

    pub fn defaults() -> Vec<Region> {
        DEFAULT_REGIONS
            .iter()
            .map(|(country, language)| Region::new(country, Some(language)))
            .collect()
    }
}

/// Maps requested country/language to the parameters the upstream accepts.
#[derive(Debug, Clone)]
pub struct RegionResolver {
    default_country: String,
    default_language: String,
}

impl Default for RegionResolver {
    fn default() -> Self {
        Self {
            default_country: "US".to_string(),
            default_language: "en".to_string(),
        }
    }
}

impl RegionResolver {
    /// Builds a resolver. Invalid defaults are themselves normalized to `US`/`en`.
    pub fn new(default_country: &str, default_language: &str) -> Self {
        let fallback = Self::default();
        let default_country = normalize_country(default_country)
            .filter(|c| c != GLOBAL_COUNTRY)
            .unwrap_or(fallback.default_country);
        let default_language =
            normalize_language(default_language).unwrap_or(fallback.default_language);

        Self {
            default_country,
            default_language,
        }
    }

    pub fn resolve(&self, requested_country: &str, requested_language: Option<&str>) -> RegionSpec {
        let country = match normalize_country(requested_country) {
            Some(code) if code == GLOBAL_COUNTRY => None,
            Some(code) => Some(code),
            None if is_global_alias(requested_country) => None,
            None => Some(self.default_country.clone()),
        };

        let language = match (&country, requested_language) {
            // Global content is always requested in the default language.
            (None, _) => None,
            (Some(_), Some(lang)) => normalize_language(lang),
            (Some(code), None) => preferred_language(code).map(str::to_string),
        }
        .unwrap_or_else(|| self.default_language.clone());

        RegionSpec { country, language }
    }

    /// Region used when a regional request fails upstream.
    pub fn default_region(&self) -> RegionSpec {
        RegionSpec {
            country: Some(self.default_country.clone()),
            language: self.default_language.clone(),
        }
    }

    pub fn is_default(&self, region: &RegionSpec) -> bool {
        region.country.as_deref() == Some(self.default_country.as_str())
    }

    pub fn resolve_region(&self, region: &Region) -> RegionSpec {
        self.resolve(&region.country, region.language.as_deref())
    }
}

fn is_global_alias(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("global")
}

fn normalize_country(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

fn normalize_language(raw: &str) -> Option<String> {
    let candidate = raw.trim().replace('-', "_");
    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| lang.eq_ignore_ascii_case(&candidate))
        .map(|lang| lang.to_string())
}

fn preferred_language(country: &str) -> Option<&'static str> {
    DEFAULT_REGIONS
        .iter()
        .find(|(code, _)| *code == country)
        .map(|(_, lang)| *lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_sentinel_has_no_country() {
        let resolver = RegionResolver::default();
        for raw in ["ZZ", "zz", "", "global"] {
            let spec = resolver.resolve(raw, Some("ko"));
            assert!(spec.is_global(), "{raw:?} should be global");
            assert_eq!(spec.country_code(), "ZZ");
            assert_eq!(spec.language(), "en");
        }
    }

    #[test]
    fn global_requests_use_configured_default_language() {
        let resolver = RegionResolver::new("KR", "ko");
        assert_eq!(resolver.resolve("ZZ", None).to_string(), "ZZ/ko");
        assert_eq!(resolver.resolve("global", Some("ja")).to_string(), "ZZ/ko");
        assert_eq!(resolver.resolve_region(&Region::new("ZZ", Some("en"))).to_string(), "ZZ/ko");
    }

    #[test]
    fn unsupported_language_falls_back_silently() {
        let resolver = RegionResolver::default();
        let spec = resolver.resolve("TH", Some("th"));
        assert_eq!(spec.country(), Some("TH"));
        assert_eq!(spec.language(), "en");
    }

    #[test]
    fn language_variants_are_normalized() {
        let resolver = RegionResolver::default();
        assert_eq!(resolver.resolve("TW", Some("zh-tw")).language(), "zh_TW");
        assert_eq!(resolver.resolve("KR", Some(" KO ")).language(), "ko");
    }

    #[test]
    fn missing_language_uses_country_preference() {
        let resolver = RegionResolver::default();
        assert_eq!(resolver.resolve("kr", None).language(), "ko");
        assert_eq!(resolver.resolve("BR", None).language(), "pt");
        assert_eq!(resolver.resolve("VN", None).language(), "en");
    }

    #[test]
    fn garbage_country_is_never_forwarded() {
        let resolver = RegionResolver::new("GB", "en");
        let spec = resolver.resolve("K0R'; DROP", Some("en"));
        assert_eq!(spec.country(), Some("GB"));
    }

    #[test]
    fn default_region_detection() {
        let resolver = RegionResolver::default();
        assert!(resolver.is_default(&resolver.resolve("us", Some("ko"))));
        assert!(!resolver.is_default(&resolver.resolve("KR", None)));
        assert!(!resolver.is_default(&resolver.resolve("ZZ", None)));
    }

    #[test]
    fn region_list_parsing() {
        let regions = Region::parse_list("KR:ko, US ,, JP:ja");
        assert_eq!(
            regions,
            vec![
                Region::new("KR", Some("ko")),
                Region::new("US", None),
                Region::new("JP", Some("ja")),
            ]
        );
        assert_eq!(Region::defaults().len(), 62);
    }
}
