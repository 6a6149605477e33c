//! Prometheus metrics for the dispatch pipeline.
//!
//! All metrics follow the naming convention: `md_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Messages handed to a delivery mode
    pub static ref MESSAGES_SENT: CounterVec = CounterVec::new(
        Opts::new("md_dispatch_messages_sent_total", "Messages handed to a delivery mode"),
        &["mode"]  // mode: direct/replicated_log/public/pairing/flush
    ).expect("metric creation failed");

    /// Send failures surfaced to callers or to the flush worker
    pub static ref SEND_FAILURES: CounterVec = CounterVec::new(
        Opts::new("md_dispatch_send_failures_total", "Failed send operations"),
        &["site"]
    ).expect("metric creation failed");

    /// Transport send latency
    pub static ref SEND_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "md_dispatch_send_duration_seconds",
            "Time spent in transport send calls"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Inbound messages by pipeline outcome
    pub static ref INBOUND_MESSAGES: CounterVec = CounterVec::new(
        Opts::new("md_inbound_messages_total", "Inbound messages by outcome and stage"),
        &["outcome", "stage"]  // outcome: delivered/dropped
    ).expect("metric creation failed");

    // =========================================================================
    // SESSION RECOVERY
    // =========================================================================

    /// Bundle advertisement attempts
    pub static ref BUNDLE_ADVERTISEMENTS: CounterVec = CounterVec::new(
        Opts::new("md_bundle_advertisements_total", "Bundle advertisement attempts"),
        &["outcome"]  // outcome: sent/not_due/failed/timeout
    ).expect("metric creation failed");

    // =========================================================================
    // REPLICATED LOG
    // =========================================================================

    /// Flush batches dispatched by the worker
    pub static ref DATASYNC_BATCHES: Counter = Counter::new(
        "md_datasync_batches_dispatched_total",
        "Replicated-log flush batches dispatched"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_SENT.clone()),
        Box::new(SEND_FAILURES.clone()),
        Box::new(SEND_DURATION.clone()),
        Box::new(INBOUND_MESSAGES.clone()),
        Box::new(BUNDLE_ADVERTISEMENTS.clone()),
        Box::new(DATASYNC_BATCHES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_counter_increment() {
        DATASYNC_BATCHES.inc();
        assert!(DATASYNC_BATCHES.get() >= 1.0);
    }

    #[test]
    fn test_gather_contains_registered_names() {
        register_metrics().unwrap();
        SEND_FAILURES.with_label_values(&["send_private"]).inc();
        let text = gather().unwrap();
        assert!(text.contains("md_dispatch_send_failures_total"));
    }

    #[test]
    fn test_histogram_timer() {
        let before = SEND_DURATION.get_sample_count();
        {
            let _timer = HistogramTimer::new(&SEND_DURATION);
        }
        assert!(SEND_DURATION.get_sample_count() > before);
    }
}
