use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::RedisConfig;
use crate::region::{Region, RegionResolver};
use crate::retry::RetryConfig;
use crate::sources::UpstreamConfig;
use crate::warming::WarmingConfig;

/// Upper bound for `RETRY_ATTEMPTS`.
const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Storage backend selected by `CACHE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Redis,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            other => anyhow::bail!("Backend de caché desconocido: {other} (memory|redis)"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Memory => "memory",
            BackendKind::Redis => "redis",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Upstream
    pub upstream_base_url: String,
    pub upstream_timeout: Duration,
    pub proxy_url_template: Option<String>,

    // Caché
    pub cache_backend: BackendKind,
    pub redis_url: Option<String>,
    pub cache_key_prefix: String,
    pub cache_max_entries: usize,

    // Región
    pub default_country: String,
    pub default_language: String,

    // Reintentos
    pub retry_attempts: u32,
    pub retry_base_secs: u64,

    // Calentamiento
    pub warming_enabled: bool,
    pub warming_interval: Duration,
    pub warming_concurrency: usize,
    pub warm_regions: Vec<Region>,
}

impl Config {
    /// Loads `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Upstream
            upstream_base_url: var("UPSTREAM_BASE_URL").unwrap_or(defaults.upstream_base_url),
            upstream_timeout: match var("UPSTREAM_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse("UPSTREAM_TIMEOUT_SECS", &v)?),
                None => defaults.upstream_timeout,
            },
            proxy_url_template: var("PROXY_URL_TEMPLATE"),

            // Caché
            cache_backend: match var("CACHE_BACKEND") {
                Some(v) => v.parse()?,
                None => defaults.cache_backend,
            },
            redis_url: var("REDIS_URL"),
            cache_key_prefix: var("CACHE_KEY_PREFIX").unwrap_or(defaults.cache_key_prefix),
            cache_max_entries: match var("CACHE_MAX_ENTRIES") {
                Some(v) => parse("CACHE_MAX_ENTRIES", &v)?,
                None => defaults.cache_max_entries,
            },

            // Región
            default_country: var("DEFAULT_COUNTRY").unwrap_or(defaults.default_country),
            default_language: var("DEFAULT_LANGUAGE").unwrap_or(defaults.default_language),

            // Reintentos
            retry_attempts: match var("RETRY_ATTEMPTS") {
                Some(v) => parse("RETRY_ATTEMPTS", &v)?,
                None => defaults.retry_attempts,
            },
            retry_base_secs: match var("RETRY_BASE_SECS") {
                Some(v) => parse("RETRY_BASE_SECS", &v)?,
                None => defaults.retry_base_secs,
            },

            // Calentamiento
            warming_enabled: match var("WARMING_ENABLED") {
                Some(v) => parse_bool("WARMING_ENABLED", &v)?,
                None => defaults.warming_enabled,
            },
            warming_interval: match var("WARMING_INTERVAL") {
                Some(v) => humantime::parse_duration(v.trim())
                    .with_context(|| format!("WARMING_INTERVAL inválido: {v}"))?,
                None => defaults.warming_interval,
            },
            warming_concurrency: match var("WARMING_CONCURRENCY") {
                Some(v) => parse("WARMING_CONCURRENCY", &v)?,
                None => defaults.warming_concurrency,
            },
            warm_regions: match var("WARM_REGIONS") {
                Some(v) => Region::parse_list(&v),
                None => defaults.warm_regions,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The redis backend needs `REDIS_URL`
    /// - Timeouts, intervals and sizes must be greater than zero
    /// - Retry attempts between 1 and 10, at least one warming region
    pub fn validate(&self) -> Result<()> {
        if self.cache_backend == BackendKind::Redis && self.redis_url.is_none() {
            anyhow::bail!("CACHE_BACKEND=redis requiere REDIS_URL");
        }

        if self.upstream_timeout.is_zero() {
            anyhow::bail!("Upstream timeout must be greater than 0");
        }

        if self.cache_max_entries == 0 {
            anyhow::bail!("Cache max entries must be greater than 0");
        }

        if self.retry_attempts == 0 || self.retry_attempts > MAX_RETRY_ATTEMPTS {
            anyhow::bail!(
                "Retry attempts must be between 1 and {}, got: {}",
                MAX_RETRY_ATTEMPTS,
                self.retry_attempts
            );
        }

        if self.warming_interval.is_zero() {
            anyhow::bail!("Warming interval must be greater than 0");
        }

        if self.warming_concurrency == 0 {
            anyhow::bail!("Warming concurrency must be greater than 0");
        }

        if self.warm_regions.is_empty() {
            anyhow::bail!("WARM_REGIONS no contiene ninguna región");
        }

        if let Some(template) = &self.proxy_url_template {
            if !template.contains("{country}") {
                anyhow::bail!("PROXY_URL_TEMPLATE debe contener {{country}}");
            }
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Credentials in the Redis URL and proxy template are not shown.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Upstream: {} (timeout {}s, proxy: {})\n  \
            Cache: {} backend, {} max entries, prefix '{}'\n  \
            Region: {}/{} por defecto\n  \
            Retry: {} intentos, base {}s\n  \
            Warming: enabled={}, cada {}, {} regiones, concurrencia {}",
            self.upstream_base_url,
            self.upstream_timeout.as_secs(),
            self.proxy_url_template.is_some(),
            self.cache_backend,
            self.cache_max_entries,
            self.cache_key_prefix,
            self.default_country,
            self.default_language,
            self.retry_attempts,
            self.retry_base_secs,
            self.warming_enabled,
            humantime::format_duration(self.warming_interval),
            self.warm_regions.len(),
            self.warming_concurrency
        )
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.upstream_base_url.clone(),
            timeout: self.upstream_timeout,
            proxy_template: self.proxy_url_template.clone(),
        }
    }

    /// Redis settings, when the redis backend is selected.
    pub fn redis_config(&self) -> Option<RedisConfig> {
        match (self.cache_backend, &self.redis_url) {
            (BackendKind::Redis, Some(url)) => Some(RedisConfig {
                redis_url: url.clone(),
                key_prefix: self.cache_key_prefix.clone(),
                ..RedisConfig::default()
            }),
            _ => None,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts,
            base_secs: self.retry_base_secs,
            timeout: self.upstream_timeout,
            ..RetryConfig::default()
        }
    }

    pub fn resolver(&self) -> RegionResolver {
        RegionResolver::new(&self.default_country, &self.default_language)
    }

    pub fn warming_config(&self) -> WarmingConfig {
        WarmingConfig {
            interval: self.warming_interval,
            concurrency: self.warming_concurrency,
            regions: self.warm_regions.clone(),
            ..WarmingConfig::default()
        }
    }
}

fn parse<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{name} inválido: {raw}"))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{name} inválido: {raw}"),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_base_url: "http://127.0.0.1:8000".to_string(),
            upstream_timeout: Duration::from_secs(30),
            proxy_url_template: None,

            cache_backend: BackendKind::Memory,
            redis_url: None,
            cache_key_prefix: "regional-cache".to_string(),
            cache_max_entries: 10_000,

            default_country: "US".to_string(),
            default_language: "en".to_string(),

            retry_attempts: 3,
            retry_base_secs: 2,

            warming_enabled: false,
            warming_interval: Duration::from_secs(24 * 3600),
            warming_concurrency: 1,
            warm_regions: Region::defaults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = from_pairs(&[]).unwrap();

        assert_eq!(config.cache_backend, BackendKind::Memory);
        assert_eq!(config.cache_max_entries, 10_000);
        assert_eq!(config.warming_interval, Duration::from_secs(86_400));
        assert_eq!(config.warm_regions.len(), 62);
        assert!(!config.warming_enabled);
        assert!(config.redis_config().is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = from_pairs(&[
            ("UPSTREAM_BASE_URL", "http://meta:9000"),
            ("UPSTREAM_TIMEOUT_SECS", "10"),
            ("PROXY_URL_TEMPLATE", "http://user-{country}:pw@proxy:7000"),
            ("CACHE_BACKEND", "Redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("CACHE_KEY_PREFIX", "music"),
            ("DEFAULT_COUNTRY", "kr"),
            ("DEFAULT_LANGUAGE", "ko"),
            ("RETRY_ATTEMPTS", "5"),
            ("WARMING_ENABLED", "true"),
            ("WARMING_INTERVAL", "6h 30m"),
            ("WARMING_CONCURRENCY", "4"),
            ("WARM_REGIONS", "KR:ko, JP , ZZ"),
        ])
        .unwrap();

        assert_eq!(config.upstream_config().timeout, Duration::from_secs(10));
        assert_eq!(config.retry_config().max_attempts, 5);
        assert_eq!(config.retry_config().timeout, Duration::from_secs(10));
        assert_eq!(config.warming_interval, Duration::from_secs(6 * 3600 + 1800));
        assert_eq!(config.warming_config().concurrency, 4);
        assert_eq!(
            config.warm_regions,
            vec![
                Region::new("KR", Some("ko")),
                Region::new("JP", None),
                Region::new("ZZ", None)
            ]
        );

        let redis = config.redis_config().unwrap();
        assert_eq!(redis.redis_url, "redis://cache:6379");
        assert_eq!(redis.key_prefix, "music");

        let fallback = config.resolver().default_region();
        assert_eq!(fallback.to_string(), "KR/ko");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(from_pairs(&[("CACHE_BACKEND", "redis")]).is_err());
        assert!(from_pairs(&[("CACHE_BACKEND", "sqlite")]).is_err());
        assert!(from_pairs(&[("RETRY_ATTEMPTS", "many")]).is_err());
        assert!(from_pairs(&[("RETRY_ATTEMPTS", "0")]).is_err());
        assert!(from_pairs(&[("RETRY_ATTEMPTS", "500")]).is_err());
        assert!(from_pairs(&[("RETRY_ATTEMPTS", "10")]).is_ok());
        assert!(from_pairs(&[("WARMING_INTERVAL", "daily")]).is_err());
        assert!(from_pairs(&[("WARMING_ENABLED", "maybe")]).is_err());
        assert!(from_pairs(&[("WARM_REGIONS", " , ")]).is_err());
        assert!(from_pairs(&[("PROXY_URL_TEMPLATE", "http://proxy:7000")]).is_err());
    }

    #[test]
    fn summary_hides_credentials() {
        let config = from_pairs(&[
            ("CACHE_BACKEND", "redis"),
            ("REDIS_URL", "redis://:secret@cache:6379"),
        ])
        .unwrap();

        let summary = config.summary();
        assert!(summary.contains("redis backend"));
        assert!(!summary.contains("secret"));
    }
}
