//! Exchange metrics
//!
//! # Metrics
//!
//! - `streamchat_exchanges_total{outcome}`: Counter of finished exchanges
//! - `streamchat_exchange_duration_seconds{outcome}`: Histogram of time from
//!   send to terminal event (or stop)
//! - `streamchat_exchanges_active`: Gauge of exchanges in flight
//! - `streamchat_stream_events_total{event}`: Counter of decoded stream events
//!
//! `outcome` is one of `completed`, `failed` or `cancelled`.

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::time::Instant;

/// Outcome label for exchanges that ended with `Completed`
pub const OUTCOME_COMPLETED: &str = "completed";
/// Outcome label for exchanges that ended with `Failed`
pub const OUTCOME_FAILED: &str = "failed";
/// Outcome label for exchanges torn down locally
pub const OUTCOME_CANCELLED: &str = "cancelled";

/// Metrics for one exchange
///
/// Created when the stream opens and recorded exactly once when the
/// exchange ends. Dropping it unrecorded only releases the active gauge.
#[derive(Debug)]
pub struct ExchangeMetrics {
    start: Instant,
    recorded: bool,
}

impl ExchangeMetrics {
    /// Starts tracking an exchange
    pub fn start() -> Self {
        increment_gauge!("streamchat_exchanges_active", 1.0);
        Self {
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Records the end of the exchange; later calls are ignored
    pub fn record(&mut self, outcome: &'static str) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        histogram!(
            "streamchat_exchange_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "outcome" => outcome
        );
        increment_counter!("streamchat_exchanges_total", "outcome" => outcome);
        decrement_gauge!("streamchat_exchanges_active", 1.0);
    }

    /// Returns true once [`record`](Self::record) has run
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }
}

impl Drop for ExchangeMetrics {
    fn drop(&mut self) {
        if !self.recorded {
            decrement_gauge!("streamchat_exchanges_active", 1.0);
        }
    }
}

/// Counts one decoded stream event
pub fn record_stream_event(event: &'static str) {
    increment_counter!("streamchat_stream_events_total", "event" => event);
}

/// Initializes the metrics exporter for Prometheus
///
/// No-op unless built with the `prometheus` feature.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
