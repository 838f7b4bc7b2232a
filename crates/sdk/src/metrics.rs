//! SDK-side metrics for observability and operational monitoring.
//!
//! This module provides a pluggable metrics trait (`SdkMetrics`) that SDK users
//! can implement to collect telemetry from the client. Two implementations are
//! included:
//!
//! - [`NoopSdkMetrics`]: Zero-overhead default that discards all metrics.
//! - [`MetricsSdkMetrics`]: Integration with the [`metrics`](https://docs.rs/metrics) crate facade,
//!   automatically forwarding to whatever recorder is installed (Prometheus, StatsD, etc.).
//!
//! # Metric Names
//!
//! All metrics follow the `daml_ledger_sdk_` prefix convention:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `daml_ledger_sdk_requests_total` | Counter | `method`, `status` | Unary calls by method and outcome |
//! | `daml_ledger_sdk_request_duration_seconds` | Histogram | `method` | Unary call latency distribution |
//! | `daml_ledger_sdk_stream_chunks_total` | Counter | `method`, `status` | Chunks received by aggregated streams |
//! | `daml_ledger_sdk_channels_total` | Counter | `endpoint`, `event` | Channel lifecycle events |
//!
//! # Example
//!
//! ```no_run
//! use daml_ledger_sdk::{ClientConfig, MetricsSdkMetrics};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder()
//!     .with_endpoint("localhost:6865")
//!     .with_metrics(Arc::new(MetricsSdkMetrics))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::{fmt, sync::Arc, time::Duration};

/// Events for channel lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A channel was created for the endpoint.
    Created,
    /// The channel was released by `close()`.
    Released,
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Released => write!(f, "released"),
        }
    }
}

/// Trait for SDK-side metrics collection.
///
/// Implement this trait to integrate with your metrics backend of choice.
/// All methods have default no-op implementations, so you only need to
/// override the metrics you care about.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` since the SDK shares a single
/// metrics instance across every cached service client.
pub trait SdkMetrics: Send + Sync + fmt::Debug {
    /// Records the outcome of a unary call.
    ///
    /// - `method`: The fully-qualified gRPC path (e.g. `/com.daml.ledger.api.v2.VersionService/GetLedgerApiVersion`).
    /// - `duration`: Wall-clock time from call start to response or failure.
    /// - `success`: Whether the call succeeded.
    fn record_request(&self, method: &str, duration: Duration, success: bool) {
        let _ = (method, duration, success);
    }

    /// Records the outcome of an aggregated server stream.
    ///
    /// - `method`: The fully-qualified gRPC path.
    /// - `chunks`: Number of chunks received before the stream closed.
    /// - `success`: Whether the stream ended normally.
    fn record_stream(&self, method: &str, chunks: u64, success: bool) {
        let _ = (method, chunks, success);
    }

    /// Records a channel lifecycle event.
    ///
    /// - `endpoint`: The server endpoint URL.
    /// - `event`: The channel event type.
    fn record_channel(&self, endpoint: &str, event: ChannelEvent) {
        let _ = (endpoint, event);
    }
}

/// No-op metrics implementation with zero overhead.
///
/// This is the default when no metrics backend is configured.
#[derive(Debug, Clone, Copy)]
pub struct NoopSdkMetrics;

impl SdkMetrics for NoopSdkMetrics {}

/// Metrics implementation using the [`metrics`](https://docs.rs/metrics) crate facade.
///
/// This forwards all SDK metrics to whatever `metrics::Recorder` is installed
/// in the process.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSdkMetrics;

/// Metric name constants for the `metrics` crate facade.
mod metric_names {
    /// Unary calls by method and outcome.
    pub const REQUESTS_TOTAL: &str = "daml_ledger_sdk_requests_total";
    /// Unary call duration distribution.
    pub const REQUEST_DURATION: &str = "daml_ledger_sdk_request_duration_seconds";
    /// Chunks received by aggregated streams.
    pub const STREAM_CHUNKS_TOTAL: &str = "daml_ledger_sdk_stream_chunks_total";
    /// Channel lifecycle events.
    pub const CHANNELS_TOTAL: &str = "daml_ledger_sdk_channels_total";
}

fn status_label(success: bool) -> &'static str {
    if success { "success" } else { "error" }
}

impl SdkMetrics for MetricsSdkMetrics {
    fn record_request(&self, method: &str, duration: Duration, success: bool) {
        metrics::counter!(metric_names::REQUESTS_TOTAL, "method" => method.to_owned(), "status" => status_label(success)).increment(1);
        metrics::histogram!(metric_names::REQUEST_DURATION, "method" => method.to_owned())
            .record(duration.as_secs_f64());
    }

    fn record_stream(&self, method: &str, chunks: u64, success: bool) {
        metrics::counter!(
            metric_names::STREAM_CHUNKS_TOTAL,
            "method" => method.to_owned(),
            "status" => status_label(success),
        )
        .increment(chunks);
    }

    fn record_channel(&self, endpoint: &str, event: ChannelEvent) {
        metrics::counter!(
            metric_names::CHANNELS_TOTAL,
            "endpoint" => endpoint.to_owned(),
            "event" => event.to_string(),
        )
        .increment(1);
    }
}

/// Creates the default metrics instance (no-op).
pub(crate) fn default_metrics() -> Arc<dyn SdkMetrics> {
    Arc::new(NoopSdkMetrics)
}
