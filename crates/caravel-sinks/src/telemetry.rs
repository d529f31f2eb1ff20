//! Built-in telemetry sink and connector.
//!
//! By default agent telemetry (the self-metrics snapshot stream) is
//! uploaded by [`TelemetrySink`] through the reliable-sink engine. When
//! the telemetry section names a redirect sink, the runtime instead
//! installs a [`TelemetryConnector`]: a source that re-publishes each
//! snapshot as a JSON record so any user-declared sink can carry the
//! telemetry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caravel_core::component::{EventSink, EventSource, Sink, Source};
use caravel_core::envelope::BoxedEnvelope;
use caravel_core::error::ComponentResult;
use caravel_core::metrics::MetricsSnapshot;
use caravel_core::subscription::{SubscriberHub, Subscription};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregate::{aggregate_by_name, default_aggregator};
use crate::reliable::{ReliableSink, ReliableSinkOptions, UploadError, UploadTransport};

/// Reserved type name of the built-in telemetry sink.
pub const TELEMETRY_SINK_TYPE: &str = "Telemetry";

/// Reserved id of the telemetry connector source.
pub const TELEMETRY_CONNECTOR_ID: &str = "_TelemetryConnector";

/// The `Telemetrics` configuration section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct TelemetryConfig {
    /// `"true"` disables telemetry entirely.
    #[serde(rename = "off")]
    pub off: Option<String>,
    /// Redirects telemetry into the named user sink instead of the
    /// built-in uploader.
    pub redirect_to_sink_id: Option<String>,
    /// Upload cadence in seconds.
    #[serde(rename = "IntervalSeconds")]
    pub interval_seconds: u64,
}

impl TelemetryConfig {
    /// Whether the section turns telemetry off.
    pub fn is_off(&self) -> bool {
        self.off.as_deref() == Some("true")
    }

    /// Upload cadence, defaulting to five minutes.
    pub fn interval(&self) -> Duration {
        if self.interval_seconds == 0 {
            Duration::from_secs(300)
        } else {
            Duration::from_secs(self.interval_seconds)
        }
    }
}

// =============================================================================
// Telemetry Sink
// =============================================================================

/// Uploads a telemetry batch rendered from the latest snapshot.
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn send(&self, record: &serde_json::Value) -> Result<(), UploadError>;
}

/// Default transport: emits the batch into the structured log. Real
/// uploaders are external collaborators wired in by the host.
pub struct LogTelemetryTransport;

#[async_trait]
impl TelemetryTransport for LogTelemetryTransport {
    async fn send(&self, record: &serde_json::Value) -> Result<(), UploadError> {
        debug!(telemetry = %record, "Telemetry batch");
        Ok(())
    }
}

struct TransportAdapter<T: TelemetryTransport>(T);

#[async_trait]
impl<T: TelemetryTransport> UploadTransport for TransportAdapter<T> {
    type Request = serde_json::Value;

    async fn send_request(&self, request: &serde_json::Value) -> Result<(), UploadError> {
        self.0.send(request).await
    }
}

struct TelemetrySinkInner<T: TelemetryTransport> {
    id: String,
    engine: ReliableSink<TransportAdapter<T>>,
    latest: Mutex<Option<MetricsSnapshot>>,
}

impl<T: TelemetryTransport> TelemetrySinkInner<T> {
    async fn upload_tick(&self) {
        let snapshot = self.latest.lock().take();
        if let Some(snapshot) = snapshot {
            let record = render_record(&snapshot);
            self.engine.send(record).await;
        }
        self.engine.flush().await;
    }
}

fn render_record(snapshot: &MetricsSnapshot) -> serde_json::Value {
    let aggregated = aggregate_by_name(&snapshot.metrics, default_aggregator);
    let entries: serde_json::Map<String, serde_json::Value> = aggregated
        .into_iter()
        .map(|(name, value)| (name, serde_json::json!(value.value)))
        .collect();
    serde_json::Value::Object(entries)
}

/// The built-in telemetry uploader.
pub struct TelemetrySink<T: TelemetryTransport + 'static> {
    inner: Arc<TelemetrySinkInner<T>>,
    interval: Duration,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl TelemetrySink<LogTelemetryTransport> {
    /// Creates the sink with the default log-only transport.
    pub fn with_default_transport(id: impl Into<String>, config: &TelemetryConfig) -> Self {
        Self::new(id, LogTelemetryTransport, config)
    }
}

impl<T: TelemetryTransport + 'static> TelemetrySink<T> {
    /// Creates the sink around a custom transport.
    pub fn new(id: impl Into<String>, transport: T, config: &TelemetryConfig) -> Self {
        Self {
            inner: Arc::new(TelemetrySinkInner {
                id: id.into(),
                engine: ReliableSink::new(
                    TransportAdapter(transport),
                    ReliableSinkOptions::default(),
                ),
                latest: Mutex::new(None),
            }),
            interval: config.interval(),
            worker: Mutex::new(None),
        }
    }

    /// Runs one upload cycle immediately.
    pub async fn poll_once(&self) {
        self.inner.upload_tick().await;
    }
}

#[async_trait]
impl<T: TelemetryTransport + 'static> Sink for TelemetrySink<T> {
    fn id(&self) -> &str {
        &self.inner.id
    }

    async fn start(&self) -> ComponentResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::clone(&self.inner);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(interval) => inner.upload_tick().await,
                }
            }
        });
        *worker = Some((token, handle));
        Ok(())
    }

    async fn stop(&self) -> ComponentResult<()> {
        let Some((token, handle)) = self.worker.lock().take() else {
            return Ok(());
        };
        token.cancel();
        if let Err(e) = handle.await {
            warn!(id = %self.inner.id, error = %e, "Telemetry worker ended abnormally");
        }
        self.inner.upload_tick().await;
        self.inner.engine.clear_queue();
        Ok(())
    }

    fn event_sink(self: Arc<Self>) -> Option<Arc<dyn EventSink>> {
        Some(self)
    }
}

impl<T: TelemetryTransport + 'static> EventSink for TelemetrySink<T> {
    fn payload_type(&self) -> &'static str {
        std::any::type_name::<MetricsSnapshot>()
    }

    fn on_envelope(&self, envelope: BoxedEnvelope) {
        if let Some(snapshot) = envelope.downcast_ref::<MetricsSnapshot>() {
            *self.inner.latest.lock() = Some(snapshot.clone());
        }
    }
}

// =============================================================================
// Telemetry Connector
// =============================================================================

/// Re-publishes self-metrics snapshots as JSON records for a redirect
/// sink.
pub struct TelemetryConnector {
    hub: SubscriberHub,
}

impl TelemetryConnector {
    pub fn new() -> Self {
        Self {
            hub: SubscriberHub::new(),
        }
    }
}

impl Default for TelemetryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for TelemetryConnector {
    fn id(&self) -> &str {
        TELEMETRY_CONNECTOR_ID
    }

    async fn start(&self) -> ComponentResult<()> {
        Ok(())
    }

    async fn stop(&self) -> ComponentResult<()> {
        Ok(())
    }

    fn event_source(self: Arc<Self>) -> Option<Arc<dyn EventSource>> {
        Some(self)
    }
}

impl EventSource for TelemetryConnector {
    fn payload_type(&self) -> &'static str {
        std::any::type_name::<serde_json::Value>()
    }

    fn subscribe(&self, subscriber: Arc<dyn EventSink>) -> Subscription {
        self.hub.subscribe(subscriber)
    }
}

impl EventSink for TelemetryConnector {
    fn payload_type(&self) -> &'static str {
        std::any::type_name::<MetricsSnapshot>()
    }

    fn on_envelope(&self, envelope: BoxedEnvelope) {
        let Some(snapshot) = envelope.downcast_ref::<MetricsSnapshot>() else {
            return;
        };
        let record = render_record(snapshot);
        self.hub.publish(envelope.with_payload(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_core::envelope::Envelope;
    use caravel_core::metrics::{CounterType, Metric, MetricKey, MetricValue};

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            metrics: vec![
                Metric {
                    key: MetricKey::new("SourcesStarted", "Program"),
                    value: MetricValue::count(2.0, CounterType::CurrentValue),
                },
                Metric {
                    key: MetricKey::new("SinksStarted", "Program"),
                    value: MetricValue::count(1.0, CounterType::CurrentValue),
                },
            ],
        }
    }

    struct CountingTransport {
        records: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl TelemetryTransport for CountingTransport {
        async fn send(&self, record: &serde_json::Value) -> Result<(), UploadError> {
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_uploads_latest_snapshot() {
        let sink = Arc::new(TelemetrySink::new(
            "_TelemetrySink",
            CountingTransport {
                records: Mutex::new(Vec::new()),
            },
            &TelemetryConfig::default(),
        ));

        sink.on_envelope(Envelope::now(snapshot()).boxed());
        sink.poll_once().await;

        let records = sink.inner.engine.transport().0.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["SourcesStarted"], 2.0);

        // The snapshot was consumed; an idle cycle uploads nothing.
        sink.poll_once().await;
        assert_eq!(sink.inner.engine.transport().0.records.lock().len(), 1);
    }

    #[test]
    fn test_config_off_switch() {
        let on = TelemetryConfig::default();
        assert!(!on.is_off());

        let off: TelemetryConfig =
            serde_json::from_value(serde_json::json!({"off": "true"})).unwrap();
        assert!(off.is_off());
    }

    #[test]
    fn test_connector_republishes_as_json() {
        struct Capture {
            records: Mutex<Vec<serde_json::Value>>,
        }
        impl EventSink for Capture {
            fn on_envelope(&self, envelope: BoxedEnvelope) {
                if let Some(value) = envelope.downcast_ref::<serde_json::Value>() {
                    self.records.lock().push(value.clone());
                }
            }
        }

        let connector = TelemetryConnector::new();
        let capture = Arc::new(Capture {
            records: Mutex::new(Vec::new()),
        });
        let _subscription = connector.subscribe(capture.clone());

        connector.on_envelope(Envelope::now(snapshot()).with_bookmark("bm").boxed());

        let records = capture.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["SinksStarted"], 1.0);
    }
}
