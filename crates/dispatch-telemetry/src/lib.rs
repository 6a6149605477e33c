//! # Dispatch Telemetry
//!
//! Structured logging and Prometheus metrics for the message dispatch
//! pipeline.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispatch_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `message-dispatch` | Service name in logs |
//! | `MD_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `MD_JSON_LOGS` | `false` | JSON log lines |
//! | `MD_CONSOLE_OUTPUT` | `true` | Emit logs to stdout |

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    gather, register_metrics, BUNDLE_ADVERTISEMENTS, DATASYNC_BATCHES, INBOUND_MESSAGES,
    MESSAGES_SENT, SEND_DURATION, SEND_FAILURES,
};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics, then install the tracing subscriber.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_tracing(&config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
