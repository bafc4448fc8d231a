//! Configuration types for LifeTrace.
//!
//! Every section has sane defaults and can be overlaid from `LIFETRACE_*`
//! environment variables. Loading goes through a lookup function so tests
//! can supply variables without touching the process environment.

use crate::error::{ConfigError, LifetraceError, LifetraceResult};
use crate::ExtractionStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// ENV HELPERS
// ============================================================================

/// Parse `key` through `lookup`, keeping `default` when unset.
///
/// A present but unparsable value is an error rather than a silent default.
fn parsed<T, F>(lookup: &F, key: &str, default: T) -> LifetraceResult<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|raw| raw.trim().to_string()) {
        None => Ok(default),
        Some(raw) if raw.is_empty() => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            LifetraceError::Config(ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw,
                reason: "could not be parsed".to_string(),
            })
        }),
    }
}

fn flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn text<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> LifetraceError {
    LifetraceError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// CACHE
// ============================================================================

/// Cache backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    File,
    Redis,
}

impl CacheBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheBackendKind {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "disk" => Ok(Self::File),
            "redis" => Ok(Self::Redis),
            _ => Err(crate::ParseEnumError {
                kind: "cache backend",
                value: s.to_string(),
            }),
        }
    }
}

/// Cache and coalescing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Explicit backend choice. `None` means auto-detect from `redis_url`.
    pub backend_override: Option<CacheBackendKind>,
    pub redis_url: Option<String>,
    pub cache_dir: PathBuf,
    /// Namespace prepended to every key in the networked store.
    pub key_prefix: String,
    /// TTL of cached biographies. `None` means entries never expire.
    pub entry_ttl: Option<Duration>,
    /// Bound on waiting for another caller's in-flight computation.
    pub coalesce_timeout: Option<Duration>,
    pub redis_connect_timeout: Duration,
    /// Lock-map size above which idle lock handles are pruned.
    pub max_tracked_keys: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend_override: None,
            redis_url: None,
            cache_dir: PathBuf::from("cache"),
            key_prefix: "lifetrace:".to_string(),
            entry_ttl: Some(Duration::from_secs(86_400)),
            coalesce_timeout: Some(Duration::from_secs(300)),
            redis_connect_timeout: Duration::from_secs(5),
            max_tracked_keys: 10_000,
        }
    }
}

impl CacheSettings {
    pub fn from_lookup<F>(lookup: &F) -> LifetraceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend_override = match text(lookup, &["LIFETRACE_CACHE_TYPE", "CACHE_TYPE"]) {
            Some(raw) => Some(
                raw.parse::<CacheBackendKind>()
                    .map_err(|e| invalid("LIFETRACE_CACHE_TYPE", &raw, &e.to_string()))?,
            ),
            None => None,
        };

        let ttl_secs: u64 = parsed(lookup, "LIFETRACE_CACHE_TTL_SECS", 86_400)?;
        let coalesce_secs: u64 = parsed(lookup, "LIFETRACE_COALESCE_TIMEOUT_SECS", 300)?;
        let connect_secs: u64 = parsed(lookup, "LIFETRACE_REDIS_CONNECT_TIMEOUT_SECS", 5)?;

        Ok(Self {
            backend_override,
            redis_url: text(lookup, &["LIFETRACE_REDIS_URL", "REDIS_URL"]),
            cache_dir: text(lookup, &["LIFETRACE_CACHE_DIR", "CACHE_DIR"])
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            key_prefix: text(lookup, &["LIFETRACE_CACHE_PREFIX"]).unwrap_or(defaults.key_prefix),
            entry_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            coalesce_timeout: (coalesce_secs > 0).then(|| Duration::from_secs(coalesce_secs)),
            redis_connect_timeout: Duration::from_secs(connect_secs),
            max_tracked_keys: parsed(
                lookup,
                "LIFETRACE_MAX_TRACKED_KEYS",
                defaults.max_tracked_keys,
            )?,
        })
    }
}

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Sliding-window rate limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    /// Requests admitted per client per window.
    pub max_requests: u32,
    pub window: Duration,
    /// Minimum spacing between sweeps of idle client windows.
    pub sweep_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 30,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl RateLimitSettings {
    pub fn from_lookup<F>(lookup: &F) -> LifetraceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            enabled: flag(lookup, "LIFETRACE_RATE_LIMIT_ENABLED", true),
            max_requests: parsed(lookup, "LIFETRACE_RATE_LIMIT_REQUESTS", 30)?,
            window: Duration::from_secs(parsed(lookup, "LIFETRACE_RATE_LIMIT_WINDOW_SECS", 60)?),
            sweep_interval: Duration::from_secs(parsed(
                lookup,
                "LIFETRACE_RATE_LIMIT_SWEEP_SECS",
                300,
            )?),
        })
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Extraction pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub default_strategy: ExtractionStrategy,
    /// Target chunk size in characters for the recursive splitter.
    pub chunk_size: usize,
    /// Characters shared between consecutive splitter chunks.
    pub chunk_overlap: usize,
    /// Splitter chunks shorter than this are discarded.
    pub min_chunk_length: usize,
    /// Paragraphs shorter than this are merged into the next one.
    pub min_paragraph_length: usize,
    pub max_points_per_chunk: usize,
    /// Aggregate point budget apportioned across chunks.
    pub total_points_target: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_strategy: ExtractionStrategy::ConcurrentChunked,
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_length: 30,
            min_paragraph_length: 200,
            max_points_per_chunk: 10,
            total_points_target: 40,
        }
    }
}

impl PipelineSettings {
    pub fn from_lookup<F>(lookup: &F) -> LifetraceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let default_strategy = match text(lookup, &["LIFETRACE_STRATEGY"]) {
            Some(raw) => raw
                .parse::<ExtractionStrategy>()
                .map_err(|e| invalid("LIFETRACE_STRATEGY", &raw, &e.to_string()))?,
            None => d.default_strategy,
        };
        Ok(Self {
            default_strategy,
            chunk_size: parsed(lookup, "LIFETRACE_CHUNK_SIZE", d.chunk_size)?,
            chunk_overlap: parsed(lookup, "LIFETRACE_CHUNK_OVERLAP", d.chunk_overlap)?,
            min_chunk_length: parsed(lookup, "LIFETRACE_MIN_CHUNK_LENGTH", d.min_chunk_length)?,
            min_paragraph_length: parsed(
                lookup,
                "LIFETRACE_MIN_PARAGRAPH_LENGTH",
                d.min_paragraph_length,
            )?,
            max_points_per_chunk: parsed(
                lookup,
                "LIFETRACE_MAX_POINTS_PER_CHUNK",
                d.max_points_per_chunk,
            )?,
            total_points_target: parsed(
                lookup,
                "LIFETRACE_TOTAL_POINTS_TARGET",
                d.total_points_target,
            )?,
        })
    }

    pub fn validate(&self) -> LifetraceResult<()> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", self.chunk_size, "chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid(
                "chunk_overlap",
                self.chunk_overlap,
                "chunk_overlap must be smaller than chunk_size",
            ));
        }
        if self.max_points_per_chunk == 0 {
            return Err(invalid(
                "max_points_per_chunk",
                self.max_points_per_chunk,
                "max_points_per_chunk must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// LLM
// ============================================================================

/// Retry policy for upstream calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (zero-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = f64::from(self.backoff_multiplier.max(1.0)).powi(attempt as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Language model provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout: Duration,
    /// Upper bound on concurrent in-flight provider calls.
    pub max_concurrency: usize,
    pub retry: RetryConfig,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-mini".to_string(),
            max_tokens: 10_000,
            temperature: 0.0,
            request_timeout: Duration::from_secs(60),
            max_concurrency: 8,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmSettings {
    pub fn from_lookup<F>(lookup: &F) -> LifetraceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Ok(Self {
            api_key: text(lookup, &["LIFETRACE_LLM_API_KEY", "OPENAI_API_KEY"]),
            base_url: text(lookup, &["LIFETRACE_LLM_BASE_URL", "OPENAI_BASE_URL"])
                .unwrap_or(d.base_url),
            model: text(lookup, &["LIFETRACE_LLM_MODEL"]).unwrap_or(d.model),
            max_tokens: parsed(lookup, "LIFETRACE_LLM_MAX_TOKENS", d.max_tokens)?,
            temperature: parsed(lookup, "LIFETRACE_LLM_TEMPERATURE", d.temperature)?,
            request_timeout: Duration::from_secs(parsed(lookup, "LIFETRACE_LLM_TIMEOUT_SECS", 60)?),
            max_concurrency: parsed(lookup, "LIFETRACE_LLM_MAX_CONCURRENCY", d.max_concurrency)?,
            retry: RetryConfig {
                max_retries: parsed(lookup, "LIFETRACE_LLM_MAX_RETRIES", d.retry.max_retries)?,
                ..d.retry
            },
        })
    }

    pub fn validate(&self) -> LifetraceResult<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(
                "temperature",
                self.temperature,
                "temperature must be between 0.0 and 2.0",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(invalid(
                "max_concurrency",
                self.max_concurrency,
                "max_concurrency must be greater than 0",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "0", "request_timeout must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration for the service core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifetraceConfig {
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub pipeline: PipelineSettings,
    pub llm: LlmSettings,
}

impl LifetraceConfig {
    /// Load from the process environment.
    pub fn from_env() -> LifetraceResult<Self> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> LifetraceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            cache: CacheSettings::from_lookup(lookup)?,
            rate_limit: RateLimitSettings::from_lookup(lookup)?,
            pipeline: PipelineSettings::from_lookup(lookup)?,
            llm: LlmSettings::from_lookup(lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - rate limit of at least one request over a non-zero window
    /// - pipeline chunking parameters
    /// - LLM temperature, concurrency, and timeout
    pub fn validate(&self) -> LifetraceResult<()> {
        if self.rate_limit.max_requests == 0 {
            return Err(invalid(
                "rate_limit.max_requests",
                self.rate_limit.max_requests,
                "max_requests must be greater than 0",
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(invalid("rate_limit.window", "0", "window must be positive"));
        }
        self.pipeline.validate()?;
        self.llm.validate()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() -> Result<(), String> {
        let config = LifetraceConfig::from_lookup(&lookup_from(&[])).map_err(|e| e.to_string())?;
        assert_eq!(config.cache.backend_override, None);
        assert_eq!(config.cache.entry_ttl, Some(Duration::from_secs(86_400)));
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.pipeline.default_strategy, ExtractionStrategy::ConcurrentChunked);
        assert_eq!(config.llm.model, "gpt-4.1-mini");
        Ok(())
    }

    #[test]
    fn test_overrides_are_applied() -> Result<(), String> {
        let lookup = lookup_from(&[
            ("LIFETRACE_CACHE_TYPE", "redis"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("LIFETRACE_RATE_LIMIT_REQUESTS", "5"),
            ("LIFETRACE_STRATEGY", "semantic-map-reduce"),
            ("LIFETRACE_COALESCE_TIMEOUT_SECS", "0"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        let config = LifetraceConfig::from_lookup(&lookup).map_err(|e| e.to_string())?;
        assert_eq!(config.cache.backend_override, Some(CacheBackendKind::Redis));
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.cache.coalesce_timeout, None);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(
            config.pipeline.default_strategy,
            ExtractionStrategy::SemanticMapReduce
        );
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        Ok(())
    }

    #[test]
    fn test_unparsable_value_is_rejected() {
        let lookup = lookup_from(&[("LIFETRACE_CHUNK_SIZE", "lots")]);
        let result = LifetraceConfig::from_lookup(&lookup);
        assert!(matches!(
            result,
            Err(LifetraceError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "LIFETRACE_CHUNK_SIZE"
        ));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let settings = PipelineSettings {
            chunk_size: 100,
            chunk_overlap: 100,
            ..PipelineSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let config = LifetraceConfig {
            rate_limit: RateLimitSettings {
                max_requests: 0,
                ..RateLimitSettings::default()
            },
            ..LifetraceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.backoff_for(0), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(1), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(350));
        assert_eq!(retry.backoff_for(10), Duration::from_millis(350));
    }
}
