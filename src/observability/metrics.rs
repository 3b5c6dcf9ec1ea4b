//! OTLP metrics implementation.
//!
//! Key metrics:
//! - courier_cache_lookups_total: Counter of cache lookups by kind and outcome
//! - courier_recent_rebuilds_total: Counter of recent-list rebuilds by outcome
//! - courier_recent_fallbacks_total: Counter of recent-list reads served straight from the store
//! - courier_fanout_failures_total: Counter of failed post-commit steps
//! - courier_fanout_dropped_total: Counter of jobs rejected by a full queue
//! - courier_write_latency_seconds: Histogram of transactional write latency

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Courier metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub cache_lookups: Counter<u64>,
    pub recent_rebuilds: Counter<u64>,
    pub recent_fallbacks: Counter<u64>,
    pub fanout_failures: Counter<u64>,
    pub fanout_dropped: Counter<u64>,
    pub write_latency: Histogram<f64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            cache_lookups: meter
                .u64_counter("courier_cache_lookups_total")
                .with_description("Cache lookups by kind (entity, recent) and outcome (hit, miss, error)")
                .with_unit("1")
                .init(),
            recent_rebuilds: meter
                .u64_counter("courier_recent_rebuilds_total")
                .with_description("Recent-list rebuilds performed under the rebuild lock")
                .with_unit("1")
                .init(),
            recent_fallbacks: meter
                .u64_counter("courier_recent_fallbacks_total")
                .with_description("Recent-list reads served from the store without caching")
                .with_unit("1")
                .init(),
            fanout_failures: meter
                .u64_counter("courier_fanout_failures_total")
                .with_description("Failed post-commit steps by step name")
                .with_unit("1")
                .init(),
            fanout_dropped: meter
                .u64_counter("courier_fanout_dropped_total")
                .with_description("Background jobs rejected because the queue was full or closed")
                .with_unit("1")
                .init(),
            write_latency: meter
                .f64_histogram("courier_write_latency_seconds")
                .with_description("Transactional write latency from begin to commit")
                .with_unit("s")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    install_manual_reader();
                }
            }
        } else {
            // Metrics are recorded but not exported.
            install_manual_reader();
        }

        let meter = global::meter("courier");
        Metrics::new(&meter)
    });
}

fn install_manual_reader() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Cache lookup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    Miss,
    Error,
}

impl LookupOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Error => "error",
        }
    }
}

/// Record a cache lookup. `kind` is `entity` or `recent`.
pub fn record_cache_lookup(kind: &'static str, outcome: LookupOutcome) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("kind", kind),
            KeyValue::new("outcome", outcome.as_str()),
        ];
        m.cache_lookups.add(1, &attrs);
    }
}

/// Record a recent-list rebuild of `size` entries.
pub fn record_recent_rebuild(size: usize) {
    if let Some(m) = METRICS.get() {
        m.recent_rebuilds.add(
            1,
            &[KeyValue::new("outcome", "ok"), KeyValue::new("empty", size == 0)],
        );
    }
}

/// Record a rebuild whose store read failed while holding the lock.
pub fn record_recent_rebuild_failed() {
    if let Some(m) = METRICS.get() {
        m.recent_rebuilds.add(1, &[KeyValue::new("outcome", "error")]);
    }
}

/// Record a recent-list read served from the store. `reason` is
/// `lock_error` or `lock_contended`.
pub fn record_recent_fallback(reason: &'static str) {
    if let Some(m) = METRICS.get() {
        m.recent_fallbacks.add(1, &[KeyValue::new("reason", reason)]);
    }
}

/// Record a failed post-commit step.
pub fn record_fanout_failure(step: &'static str) {
    if let Some(m) = METRICS.get() {
        m.fanout_failures.add(1, &[KeyValue::new("step", step)]);
    }
}

/// Record a background job rejected at submit time.
pub fn record_fanout_dropped(task: &'static str) {
    if let Some(m) = METRICS.get() {
        m.fanout_dropped.add(1, &[KeyValue::new("task", task)]);
    }
}

/// Record a committed write.
pub fn record_write(operation: &'static str, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        m.write_latency
            .record(latency_seconds, &[KeyValue::new("operation", operation)]);
    }
}
