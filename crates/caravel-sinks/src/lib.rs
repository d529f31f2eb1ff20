//! # Caravel Sinks
//!
//! The reliability layer behind Caravel's upstream sinks.
//!
//! The centerpiece is the [`ReliableSink`] engine: idempotent uploads are
//! retried in-flight with jittered, attempt-linear backoff; batches that
//! exhaust their attempt budget are demoted to a bounded FIFO
//! [`RetryQueue`] which a single-holder flusher drains once the remote
//! recovers. [`ReliableMetricsSink`] builds the agent's metrics uploads on
//! top of that engine, and the built-in telemetry and performance-counter
//! sinks register themselves through the core's factory discovery.

pub mod aggregate;
pub mod builtin;
pub mod metrics_sink;
pub mod perfcounter;
pub mod queue;
pub mod reliable;
pub mod telemetry;

pub use aggregate::{aggregate_by_name, default_aggregator};
pub use metrics_sink::{
    Aggregator, MetricsSinkBuilder, MetricsSinkOptions, ReliableMetricsSink, RequestBuilder,
};
pub use perfcounter::{PerformanceCounterSink, PERFORMANCE_COUNTER_SINK_TYPE};
pub use queue::{RetryQueue, RETRY_QUEUE_LIMIT};
pub use reliable::{
    CounterSnapshot, ReliableSink, ReliableSinkOptions, SinkCounters, UploadError, UploadTransport,
};
pub use telemetry::{
    LogTelemetryTransport, TelemetryConfig, TelemetryConnector, TelemetrySink, TelemetryTransport,
    TELEMETRY_CONNECTOR_ID, TELEMETRY_SINK_TYPE,
};
