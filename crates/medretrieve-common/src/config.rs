//! Process configuration, loaded once in `main` and passed down explicitly
//! as part of `AppContext` (spec §9: no global mutable singletons).
//!
//! Every default below mirrors spec §6 ("Configuration") byte for byte.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerSettings {
    pub target_tokens: u32,
    pub hard_max_tokens: u32,
    pub overlap_tokens: u32,
    pub version: String,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self { target_tokens: 300, hard_max_tokens: 450, overlap_tokens: 50, version: "v1".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub global: u32,
    pub per_tool_search: u32,
    pub per_tool_sync: u32,
    pub per_tool_get: u32,
    pub per_tool_ingest: u32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self { global: 200, per_tool_search: 50, per_tool_sync: 8, per_tool_get: 100, per_tool_ingest: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub error_threshold: u32,
    pub window_seconds: u64,
    pub min_samples: u32,
    pub error_rate_threshold: f64,
    pub open_base_seconds: u64,
    pub open_max_seconds: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            window_seconds: 30,
            min_samples: 20,
            error_rate_threshold: 0.5,
            open_base_seconds: 5,
            open_max_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub retry_backoff_seconds: Vec<u64>,
    pub max_retries: u32,
    pub progress_throttle_seconds: u64,
    pub idempotency_window_hours: i64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            retry_backoff_seconds: vec![5, 15, 45],
            max_retries: 3,
            progress_throttle_seconds: 2,
            idempotency_window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCacheSettings {
    pub ttl_seconds: u64,
    pub capacity: usize,
}

impl Default for SearchCacheSettings {
    fn default() -> Self {
        Self { ttl_seconds: 300, capacity: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadySettings {
    pub probe_timeout_ms: u64,
    pub cache_ttl_ms: u64,
}

impl Default for ReadySettings {
    fn default() -> Self {
        Self { probe_timeout_ms: 5000, cache_ttl_ms: 5000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSettings {
    pub default_overlap_days: i64,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self { default_overlap_days: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub vector_store_path: String,
    pub chunker: ChunkerSettings,
    pub limiter: LimiterSettings,
    pub breaker: BreakerSettings,
    pub job: JobSettings,
    pub search_cache: SearchCacheSettings,
    pub ready: ReadySettings,
    pub watermark: WatermarkSettings,
    /// Shared-secret value expected on the invoke surface (Non-goal: anything
    /// beyond this simple shared-secret model).
    pub shared_secret: Option<String>,
    /// Configured literature sources, name -> base URL, fetched through
    /// `HttpSourceNormalizer` (§4.4 treats the native wire format as out of
    /// scope; this is the already-normalized-JSON-feed seam).
    pub sources: std::collections::BTreeMap<String, String>,
}

impl AppConfig {
    /// Loads `.env` (if present), then an optional TOML file, then environment
    /// overrides, falling back to the defaults above for anything unset.
    pub fn load(toml_path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = if let Some(path) = toml_path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            } else {
                AppConfig::default()
            }
        } else {
            AppConfig::default()
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database_url = url;
        }
        if let Ok(path) = std::env::var("VECTOR_STORE_PATH") {
            cfg.vector_store_path = path;
        }
        if let Ok(secret) = std::env::var("MEDRETRIEVE_SHARED_SECRET") {
            cfg.shared_secret = Some(secret);
        }
        if let Ok(sources) = std::env::var("MEDRETRIEVE_SOURCES") {
            cfg.sources = parse_sources(&sources);
        }

        Ok(cfg)
    }
}

/// Parses `"name=url,name2=url2"` into a source map; malformed entries
/// (missing `=`) are skipped rather than failing startup.
fn parse_sources(raw: &str) -> std::collections::BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .map(|(name, url)| (name.trim().to_string(), url.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.chunker.target_tokens, 300);
        assert_eq!(cfg.chunker.hard_max_tokens, 450);
        assert_eq!(cfg.limiter.global, 200);
        assert_eq!(cfg.limiter.per_tool_search, 50);
        assert_eq!(cfg.job.retry_backoff_seconds, vec![5, 15, 45]);
        assert_eq!(cfg.search_cache.ttl_seconds, 300);
        assert_eq!(cfg.watermark.default_overlap_days, 1);
    }

    #[test]
    fn parses_source_map_and_skips_malformed_entries() {
        let sources = parse_sources("pubmed=https://a.example/feed, , broken, other=https://b.example");
        assert_eq!(sources.get("pubmed").map(String::as_str), Some("https://a.example/feed"));
        assert_eq!(sources.get("other").map(String::as_str), Some("https://b.example"));
        assert_eq!(sources.len(), 2);
    }
}
