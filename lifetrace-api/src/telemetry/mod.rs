//! LifeTrace Telemetry - Observability Infrastructure
//!
//! Structured logging setup, Prometheus metrics, and the per-request
//! observability middleware.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, LifetraceMetrics, MeteredModel, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig};
