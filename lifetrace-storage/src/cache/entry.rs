//! On-storage envelope for cached values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A cached value with its lifetime.
///
/// Serialized as `{data, created_time, expire_time}`. A missing or null
/// `expire_time` means the entry never expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub data: Value,
    pub created_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
}

impl StoredEntry {
    pub fn new(data: Value, ttl: Option<Duration>) -> Self {
        Self::created_at(data, Utc::now(), ttl)
    }

    pub fn created_at(data: Value, created_time: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        // A TTL too large to represent is treated as no expiry.
        let expire_time = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| created_time.checked_add_signed(ttl));
        Self {
            data,
            created_time,
            expire_time,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_time.is_some_and(|expires| now >= expires)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
