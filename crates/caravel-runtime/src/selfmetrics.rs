//! The self-metrics source.
//!
//! A built-in source living under a reserved id. Every component (and the
//! manager itself) publishes counters into it through the shared
//! [`MetricsPublisher`] handle in its plugin context; the source
//! accumulates them and serves consumers two ways:
//!
//! - **event-stream**: a periodic [`MetricsSnapshot`] envelope to every
//!   subscriber (the built-in telemetry and performance-counter sinks);
//! - **data-pull**: [`DataSource::query`] for metrics sinks that poll on
//!   their own cadence.
//!
//! Accumulation follows the counter type: current values replace,
//! increments add, averages keep a running mean.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caravel_core::component::{DataSource, EventSink, EventSource, Source};
use caravel_core::envelope::Envelope;
use caravel_core::error::ComponentResult;
use caravel_core::metrics::{
    CounterType, Metric, MetricKey, MetricUnit, MetricValue, MetricsPublisher, MetricsSnapshot,
};
use caravel_core::subscription::{SubscriberHub, Subscription};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Reserved id of the self-metrics source.
pub const SELF_METRICS_SOURCE_ID: &str = "_SelfMetrics";

enum Accumulator {
    Current(MetricValue),
    Sum(MetricValue),
    Mean { sum: f64, count: u64, unit: MetricUnit },
}

impl Accumulator {
    fn new(counter_type: CounterType, value: MetricValue) -> Self {
        match counter_type {
            CounterType::CurrentValue => Self::Current(value),
            CounterType::Increment => Self::Sum(value),
            CounterType::Average => Self::Mean {
                sum: value.value,
                count: 1,
                unit: value.unit,
            },
        }
    }

    fn apply(&mut self, value: MetricValue) {
        match self {
            Self::Current(current) => *current = value,
            Self::Sum(total) => total.value += value.value,
            Self::Mean { sum, count, .. } => {
                *sum += value.value;
                *count += 1;
            }
        }
    }

    fn value(&self) -> MetricValue {
        match self {
            Self::Current(value) => *value,
            Self::Sum(total) => *total,
            Self::Mean { sum, count, unit } => MetricValue {
                value: if *count == 0 { 0.0 } else { sum / *count as f64 },
                unit: *unit,
                counter_type: CounterType::Average,
            },
        }
    }
}

struct SelfMetricsInner {
    counters: Mutex<HashMap<MetricKey, Accumulator>>,
    hub: SubscriberHub,
}

impl SelfMetricsInner {
    fn snapshot(&self) -> Vec<Metric> {
        let mut metrics: Vec<Metric> = self
            .counters
            .lock()
            .iter()
            .map(|(key, accumulator)| Metric {
                key: key.clone(),
                value: accumulator.value(),
            })
            .collect();
        metrics.sort_by(|a, b| a.key.cmp(&b.key));
        metrics
    }

    fn emit(&self) {
        self.hub.publish(
            Envelope::now(MetricsSnapshot {
                metrics: self.snapshot(),
            })
            .boxed(),
        );
    }
}

/// The agent's in-process metrics accumulator and producer.
pub struct SelfMetricsSource {
    inner: Arc<SelfMetricsInner>,
    interval: Mutex<Duration>,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SelfMetricsSource {
    /// Creates the source with the default one-minute snapshot cadence.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SelfMetricsInner {
                counters: Mutex::new(HashMap::new()),
                hub: SubscriberHub::new(),
            }),
            interval: Mutex::new(Duration::from_secs(60)),
            worker: Mutex::new(None),
        }
    }

    /// Sets the snapshot cadence. Takes effect at the next start.
    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock() = interval.max(Duration::from_secs(1));
    }

    /// Current value of a dimensionless counter, for the manager's own
    /// bookkeeping and for tests.
    pub fn value(&self, name: &str, category: &str) -> Option<f64> {
        let key = MetricKey::new(name, category);
        self.inner
            .counters
            .lock()
            .get(&key)
            .map(|accumulator| accumulator.value().value)
    }

    /// A snapshot of every accumulated metric.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.inner.snapshot()
    }

    /// Pushes one snapshot envelope to subscribers immediately.
    pub fn emit_now(&self) {
        self.inner.emit();
    }
}

impl Default for SelfMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsPublisher for SelfMetricsSource {
    fn publish(
        &self,
        id: &str,
        category: &str,
        counter_type: CounterType,
        entries: HashMap<String, MetricValue>,
    ) {
        let mut counters = self.inner.counters.lock();
        for (name, value) in entries {
            let mut key = MetricKey::new(name, category);
            if !id.is_empty() {
                key = key.with_dimension("id", id);
            }
            counters
                .entry(key)
                .and_modify(|accumulator| accumulator.apply(value))
                .or_insert_with(|| Accumulator::new(counter_type, value));
        }
    }
}

#[async_trait]
impl Source for SelfMetricsSource {
    fn id(&self) -> &str {
        SELF_METRICS_SOURCE_ID
    }

    async fn start(&self) -> ComponentResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::clone(&self.inner);
        let interval = *self.interval.lock();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(interval) => inner.emit(),
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
            warn!(error = %e, "Self-metrics worker ended abnormally");
        }
        Ok(())
    }

    fn event_source(self: Arc<Self>) -> Option<Arc<dyn EventSource>> {
        Some(self)
    }

    fn data_source(self: Arc<Self>) -> Option<Arc<dyn DataSource>> {
        Some(self)
    }
}

impl EventSource for SelfMetricsSource {
    fn payload_type(&self) -> &'static str {
        std::any::type_name::<MetricsSnapshot>()
    }

    fn subscribe(&self, subscriber: Arc<dyn EventSink>) -> Subscription {
        self.inner.hub.subscribe(subscriber)
    }
}

impl DataSource for SelfMetricsSource {
    fn query(&self) -> Vec<Metric> {
        self.inner.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_core::envelope::BoxedEnvelope;
    use caravel_core::metrics::counters;

    fn one(name: &str, value: f64) -> HashMap<String, MetricValue> {
        HashMap::from([(
            name.to_string(),
            MetricValue::count(value, CounterType::Increment),
        )])
    }

    #[test]
    fn test_increment_accumulates() {
        let source = SelfMetricsSource::new();
        source.publish(
            "",
            counters::CATEGORY_PROGRAM,
            CounterType::Increment,
            one(counters::CONFIG_RELOAD_SUCCESS, 1.0),
        );
        source.publish(
            "",
            counters::CATEGORY_PROGRAM,
            CounterType::Increment,
            one(counters::CONFIG_RELOAD_SUCCESS, 1.0),
        );

        assert_eq!(
            source.value(counters::CONFIG_RELOAD_SUCCESS, counters::CATEGORY_PROGRAM),
            Some(2.0)
        );
    }

    #[test]
    fn test_current_value_replaces() {
        let source = SelfMetricsSource::new();
        for value in [3.0, 5.0] {
            source.publish(
                "",
                counters::CATEGORY_PROGRAM,
                CounterType::CurrentValue,
                HashMap::from([(
                    counters::SOURCES_STARTED.to_string(),
                    MetricValue::count(value, CounterType::CurrentValue),
                )]),
            );
        }

        assert_eq!(
            source.value(counters::SOURCES_STARTED, counters::CATEGORY_PROGRAM),
            Some(5.0)
        );
    }

    #[test]
    fn test_average_keeps_running_mean() {
        let source = SelfMetricsSource::new();
        for sample in [10.0, 20.0, 60.0] {
            source.publish(
                "k1",
                counters::CATEGORY_SINKS,
                CounterType::Average,
                HashMap::from([(
                    counters::LATENCY.to_string(),
                    MetricValue::latency_ms(sample),
                )]),
            );
        }

        let snapshot = source.snapshot();
        let latency = snapshot
            .iter()
            .find(|m| m.key.name == counters::LATENCY)
            .unwrap();
        assert_eq!(latency.value.value, 30.0);
        assert_eq!(latency.value.unit, MetricUnit::Milliseconds);
        // Publisher id lands as a dimension.
        assert_eq!(latency.key.dimensions["id"], "k1");
    }

    #[test]
    fn test_snapshot_envelopes_reach_subscribers() {
        struct Capture {
            snapshots: Mutex<Vec<usize>>,
        }
        impl EventSink for Capture {
            fn on_envelope(&self, envelope: BoxedEnvelope) {
                if let Some(snapshot) = envelope.downcast_ref::<MetricsSnapshot>() {
                    self.snapshots.lock().push(snapshot.metrics.len());
                }
            }
        }

        let source = SelfMetricsSource::new();
        let capture = Arc::new(Capture {
            snapshots: Mutex::new(Vec::new()),
        });
        let _subscription = source.subscribe(capture.clone());

        source.publish(
            "",
            counters::CATEGORY_PROGRAM,
            CounterType::Increment,
            one(counters::SOURCES_STARTED, 1.0),
        );
        source.emit_now();

        assert_eq!(*capture.snapshots.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_double_stop_is_noop() {
        let source = SelfMetricsSource::new();
        source.start().await.unwrap();
        source.stop().await.unwrap();
        source.stop().await.unwrap();
    }
}
