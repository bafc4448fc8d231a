//! Sliding-window rate limiting.
//!
//! Each client keeps the instants of its recent admitted requests. A request
//! is admitted while fewer than `max_requests` of them fall inside the last
//! `window`. Pruning, the count check, and the append happen under the
//! client's map entry lock, so concurrent requests from one client cannot
//! overshoot the limit.
//!
//! Clients whose window has emptied are swept opportunistically, at most
//! once per `sweep_interval`, by whichever request happens to arrive.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use lifetrace_core::RateLimitSettings;

use crate::error::ApiError;
use crate::telemetry::METRICS;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

const UNKNOWN_CLIENT: &str = "unknown";

// ============================================================================
// LIMITER
// ============================================================================

/// Window metadata attached to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window.
    pub reset_after: Duration,
    /// Unix epoch seconds at which `reset_after` runs out, fixed when the
    /// request was decided.
    pub reset_epoch: i64,
    pub window: Duration,
}

impl RateLimitInfo {
    pub fn reset_epoch_secs(&self) -> i64 {
        self.reset_epoch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Admitted(RateLimitInfo),
    Rejected {
        info: RateLimitInfo,
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    pub fn info(&self) -> &RateLimitInfo {
        match self {
            Self::Admitted(info) | Self::Rejected { info, .. } => info,
        }
    }
}

/// Per-client sliding-window counter.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    enabled: bool,
    max_requests: u32,
    window: Duration,
    sweep_interval: Duration,
    windows: DashMap<String, VecDeque<Instant>>,
    last_sweep: Mutex<Instant>,
}

impl SlidingWindowLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_requests: settings.max_requests,
            window: settings.window,
            sweep_interval: settings.sweep_interval,
            windows: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of clients currently holding a window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    pub fn check(&self, client_id: &str) -> RateLimitDecision {
        self.check_at(client_id, Instant::now())
    }

    /// Decide on one request from `client_id` arriving at `now`.
    pub fn check_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        self.maybe_sweep(now);
        let decided_at = chrono::Utc::now().timestamp();

        let mut timestamps = self.windows.entry(client_id.to_string()).or_default();
        prune(&mut timestamps, now, self.window);

        let count = timestamps.len() as u32;
        if count >= self.max_requests {
            let reset_after = self.time_until_oldest_expires(&timestamps, now);
            let info = self.info(0, reset_after, decided_at);
            return RateLimitDecision::Rejected {
                info,
                retry_after: Duration::from_secs(ceil_secs(reset_after).max(1)),
            };
        }

        timestamps.push_back(now);
        let reset_after = self.time_until_oldest_expires(&timestamps, now);
        RateLimitDecision::Admitted(self.info(self.max_requests - count - 1, reset_after, decided_at))
    }

    fn info(&self, remaining: u32, reset_after: Duration, decided_at: i64) -> RateLimitInfo {
        RateLimitInfo {
            limit: self.max_requests,
            remaining,
            reset_after,
            reset_epoch: decided_at + ceil_secs(reset_after) as i64,
            window: self.window,
        }
    }

    /// Drop clients with no requests left in their window.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Swept idle rate limit windows");
        }
        removed
    }

    fn maybe_sweep(&self, now: Instant) {
        // Another request is already sweeping or holds the timer.
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < self.sweep_interval {
            return;
        }
        *last = now;
        drop(last);
        self.sweep(now);
    }

    fn time_until_oldest_expires(&self, timestamps: &VecDeque<Instant>, now: Instant) -> Duration {
        timestamps
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(self.window)
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while timestamps
        .front()
        .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= window)
    {
        timestamps.pop_front();
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

// ============================================================================
// CLIENT IDENTIFICATION
// ============================================================================

/// Identify the client: first `x-forwarded-for` entry, then `x-real-ip`,
/// then the peer address.
pub fn client_id_from(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Rate limiting middleware.
///
/// Admitted and rejected responses both carry the `x-ratelimit-*` headers.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<SlidingWindowLimiter>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client_id = client_id_from(request.headers(), connect_info.map(|ConnectInfo(addr)| addr));
    let decision = limiter.check(&client_id);

    let mut response = match decision {
        RateLimitDecision::Admitted(_) => next.run(request).await,
        RateLimitDecision::Rejected { info, retry_after } => {
            tracing::warn!(
                client = %client_id,
                limit = info.limit,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            if let Ok(m) = METRICS.as_ref() {
                m.record_rate_limit_rejection();
            }
            ApiError::rate_limited(info.limit, info.window, retry_after).into_response()
        }
    };

    insert_rate_limit_headers(response.headers_mut(), decision.info());
    response
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    let values = [
        (X_RATELIMIT_LIMIT, info.limit.to_string()),
        (X_RATELIMIT_REMAINING, info.remaining.to_string()),
        (X_RATELIMIT_RESET, info.reset_epoch_secs().to_string()),
        (X_RATELIMIT_WINDOW, info.window.as_secs().to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
