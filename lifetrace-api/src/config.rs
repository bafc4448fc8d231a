//! API Configuration Module
//!
//! HTTP-facing settings: listen address, CORS, and the Wikipedia client.
//! Cache, rate limit, pipeline, and LLM settings live in
//! [`LifetraceConfig`](lifetrace_core::LifetraceConfig).

use std::net::SocketAddr;
use std::time::Duration;

use lifetrace_core::{ConfigError, LifetraceError, LifetraceResult};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_USER_AGENT: &str = concat!("LifeTrace/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the listener, CORS, and upstream article fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Timeout for each Wikipedia API call.
    pub wikipedia_timeout: Duration,

    pub wikipedia_user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            wikipedia_timeout: Duration::from_secs(30),
            wikipedia_user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LIFETRACE_BIND_ADDR`: Listen address (default: 0.0.0.0:8000)
    /// - `LIFETRACE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `LIFETRACE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `LIFETRACE_WIKIPEDIA_TIMEOUT_SECS`: Per-call timeout (default: 30)
    /// - `LIFETRACE_WIKIPEDIA_USER_AGENT`: User agent sent to Wikipedia
    pub fn from_env() -> LifetraceResult<Self> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> LifetraceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_raw = lookup("LIFETRACE_BIND_ADDR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|_| invalid("LIFETRACE_BIND_ADDR", &bind_raw, "expected host:port"))?;

        let cors_origins = lookup("LIFETRACE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = seconds(lookup, "LIFETRACE_CORS_MAX_AGE_SECS")?
            .unwrap_or(defaults.cors_max_age_secs);

        let wikipedia_timeout = match seconds(lookup, "LIFETRACE_WIKIPEDIA_TIMEOUT_SECS")? {
            Some(0) => {
                return Err(invalid(
                    "LIFETRACE_WIKIPEDIA_TIMEOUT_SECS",
                    "0",
                    "timeout must be positive",
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.wikipedia_timeout,
        };

        let wikipedia_user_agent = lookup("LIFETRACE_WIKIPEDIA_USER_AGENT")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.wikipedia_user_agent);

        Ok(Self {
            bind_addr,
            cors_origins,
            cors_max_age_secs,
            wikipedia_timeout,
            wikipedia_user_agent,
        })
    }

    /// Check if an origin is allowed by CORS configuration.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == origin)
    }
}

fn seconds<F>(lookup: &F, key: &str) -> LifetraceResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|s| s.trim().to_string()) {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, &raw, "expected whole seconds")),
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> LifetraceError {
    LifetraceError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
