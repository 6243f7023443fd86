use prometheus::{
    core::Collector, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Order creation outcomes: created, rejected, timeout
pub static ORDERS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("upay_orders_total", "Order creation attempts by outcome"),
        &["result"],
    )
    .unwrap()
});

pub static RATE_LIMITED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "upay_rate_limited_total",
        "Order creation attempts refused by the rate limiter",
    )
    .unwrap()
});

// Notification outcomes: success, failed, malformed
pub static NOTIFICATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("upay_notifications_total", "Payment notifications by outcome"),
        &["result"],
    )
    .unwrap()
});

pub static UPSTREAM_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "upay_upstream_latency_seconds",
            "Latency of order API calls to the processor",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .unwrap()
});

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(ORDERS_TOTAL.clone()),
        Box::new(RATE_LIMITED_TOTAL.clone()),
        Box::new(NOTIFICATIONS_TOTAL.clone()),
        Box::new(UPSTREAM_LATENCY.clone()),
    ];
    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            tracing::debug!("metric registration skipped: {}", e);
        }
    }
}

/// Text exposition of everything in [`REGISTRY`].
pub fn metrics_output() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
