//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing in text or JSON format
//! - OpenTelemetry metrics for cache, rebuild and fan-out behaviour

pub mod metrics;
pub mod tracing;
