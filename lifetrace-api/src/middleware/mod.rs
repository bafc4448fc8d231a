//! Request middleware.

pub mod rate_limit;

pub use rate_limit::{
    client_id_from, rate_limit_middleware, RateLimitDecision, RateLimitInfo, SlidingWindowLimiter,
};
