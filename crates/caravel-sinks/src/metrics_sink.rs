//! The reliable metrics sink.
//!
//! A data-pull sink: the binder registers metric sources into it, and on
//! its own cadence the sink queries them, aggregates by metric name, and
//! uploads one batch through the reliable-sink engine, then gives the
//! retry queue a flush tick. Stopping cancels the cadence, performs a
//! final flush, and empties the queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caravel_core::component::{DataSink, DataSource, Sink};
use caravel_core::error::ComponentResult;
use caravel_core::metrics::{counters, CounterType, Metric, MetricValue, MetricsPublisher};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregate::{aggregate_by_name, default_aggregator};
use crate::reliable::{ReliableSink, ReliableSinkOptions, UploadTransport};

/// Produces an upload batch from the aggregated metrics.
pub type RequestBuilder<R> = Box<dyn Fn(&BTreeMap<String, MetricValue>) -> R + Send + Sync>;

/// Collapses one name group's values into a single aggregate.
pub type Aggregator = Box<dyn Fn(&[MetricValue]) -> MetricValue + Send + Sync>;

/// Tuning for a [`ReliableMetricsSink`].
#[derive(Debug, Clone)]
pub struct MetricsSinkOptions {
    /// How often metrics are pulled, aggregated, and uploaded.
    pub upload_interval: Duration,
    /// Engine (retry/flush) tuning.
    pub engine: ReliableSinkOptions,
}

impl Default for MetricsSinkOptions {
    fn default() -> Self {
        Self {
            upload_interval: Duration::from_secs(60),
            engine: ReliableSinkOptions::default(),
        }
    }
}

/// Builder for [`ReliableMetricsSink`].
pub struct MetricsSinkBuilder<T: UploadTransport> {
    id: String,
    transport: T,
    options: MetricsSinkOptions,
    aggregator: Aggregator,
    publisher: Option<Arc<dyn MetricsPublisher>>,
}

impl<T: UploadTransport + 'static> MetricsSinkBuilder<T> {
    /// Starts a builder for a sink with the given id and transport.
    pub fn new(id: impl Into<String>, transport: T) -> Self {
        Self {
            id: id.into(),
            transport,
            options: MetricsSinkOptions::default(),
            aggregator: Box::new(default_aggregator),
            publisher: None,
        }
    }

    /// Overrides the sink options.
    pub fn with_options(mut self, options: MetricsSinkOptions) -> Self {
        self.options = options;
        self
    }

    /// Overrides the per-group aggregator.
    pub fn with_aggregator<F>(mut self, aggregator: F) -> Self
    where
        F: Fn(&[MetricValue]) -> MetricValue + Send + Sync + 'static,
    {
        self.aggregator = Box::new(aggregator);
        self
    }

    /// Publishes the sink's own transport counters through the given
    /// publisher after every upload cycle.
    pub fn with_publisher(mut self, publisher: Arc<dyn MetricsPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Finishes the sink with the batch builder that turns aggregates
    /// into transport requests.
    pub fn build<F>(self, build_request: F) -> ReliableMetricsSink<T>
    where
        F: Fn(&BTreeMap<String, MetricValue>) -> T::Request + Send + Sync + 'static,
    {
        ReliableMetricsSink {
            inner: Arc::new(MetricsSinkInner {
                id: self.id,
                engine: ReliableSink::new(self.transport, self.options.engine),
                sources: RwLock::new(Vec::new()),
                build_request: Box::new(build_request),
                aggregator: self.aggregator,
                publisher: self.publisher,
            }),
            upload_interval: self.options.upload_interval,
            worker: Mutex::new(None),
        }
    }
}

struct MetricsSinkInner<T: UploadTransport> {
    id: String,
    engine: ReliableSink<T>,
    sources: RwLock<Vec<Arc<dyn DataSource>>>,
    build_request: RequestBuilder<T::Request>,
    aggregator: Aggregator,
    publisher: Option<Arc<dyn MetricsPublisher>>,
}

impl<T: UploadTransport> MetricsSinkInner<T> {
    fn collect(&self) -> Vec<Metric> {
        let sources: Vec<Arc<dyn DataSource>> = self.sources.read().clone();
        sources.iter().flat_map(|source| source.query()).collect()
    }

    async fn upload_tick(&self) {
        let metrics = self.collect();
        if !metrics.is_empty() {
            let aggregated = aggregate_by_name(&metrics, &*self.aggregator);
            let request = (self.build_request)(&aggregated);
            self.engine.send(request).await;
        } else {
            debug!(id = %self.id, "No metrics to upload this cycle");
        }
        self.engine.flush().await;
        self.publish_counters();
    }

    fn publish_counters(&self) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let snapshot = self.engine.counters().snapshot();
        let entries: HashMap<String, MetricValue> = [
            (counters::SERVICE_SUCCESS, snapshot.service_success),
            (
                counters::RECOVERABLE_SERVICE_ERRORS,
                snapshot.recoverable_service_errors,
            ),
            (
                counters::NONRECOVERABLE_SERVICE_ERRORS,
                snapshot.nonrecoverable_service_errors,
            ),
            (counters::LATENCY, snapshot.latency_ms),
        ]
        .into_iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                MetricValue::count(value as f64, CounterType::CurrentValue),
            )
        })
        .collect();
        publisher.publish(
            &self.id,
            counters::CATEGORY_SINKS,
            CounterType::CurrentValue,
            entries,
        );
    }
}

/// A metrics sink built on the reliable-sink engine.
pub struct ReliableMetricsSink<T: UploadTransport + 'static> {
    inner: Arc<MetricsSinkInner<T>>,
    upload_interval: Duration,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl<T: UploadTransport + 'static> ReliableMetricsSink<T> {
    /// Runs one pull/aggregate/upload/flush cycle immediately. Hosts with
    /// their own scheduling call this instead of `start`.
    pub async fn poll_once(&self) {
        self.inner.upload_tick().await;
    }

    /// Current retry-queue length.
    pub fn queue_len(&self) -> usize {
        self.inner.engine.queue_len()
    }

    /// The engine behind this sink.
    pub fn engine(&self) -> &ReliableSink<T> {
        &self.inner.engine
    }
}

#[async_trait]
impl<T: UploadTransport + 'static> Sink for ReliableMetricsSink<T> {
    fn id(&self) -> &str {
        &self.inner.id
    }

    async fn start(&self) -> ComponentResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let interval = self.upload_interval;
        let child = token.clone();
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
            warn!(id = %self.inner.id, error = %e, "Metrics sink worker ended abnormally");
        }

        // Last chance for the queue before it is discarded with the sink.
        self.inner.engine.flush().await;
        self.inner.engine.clear_queue();
        Ok(())
    }

    fn data_sink(self: Arc<Self>) -> Option<Arc<dyn DataSink>> {
        Some(self)
    }
}

impl<T: UploadTransport + 'static> DataSink for ReliableMetricsSink<T> {
    fn register_data_source(&self, source: Arc<dyn DataSource>) {
        self.inner.sources.write().push(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_core::metrics::{MetricKey, MetricUnit};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyTransport {
        attempts: AtomicU32,
        failures: u32,
        batches: Mutex<Vec<BTreeMap<String, f64>>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                failures,
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UploadTransport for FlakyTransport {
        type Request = BTreeMap<String, f64>;

        async fn send_request(&self, request: &Self::Request) -> Result<(), crate::reliable::UploadError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(crate::reliable::UploadError::Recoverable("503".into()));
            }
            self.batches.lock().push(request.clone());
            Ok(())
        }
    }

    struct FixedSource {
        metrics: Vec<Metric>,
    }

    impl DataSource for FixedSource {
        fn query(&self) -> Vec<Metric> {
            self.metrics.clone()
        }
    }

    fn counter(name: &str, id: &str, value: f64) -> Metric {
        Metric {
            key: MetricKey::new(name, "Sinks").with_dimension("id", id),
            value: MetricValue {
                value,
                unit: MetricUnit::Count,
                counter_type: CounterType::Increment,
            },
        }
    }

    fn fast_sink(failures: u32) -> ReliableMetricsSink<FlakyTransport> {
        MetricsSinkBuilder::new("metrics-1", FlakyTransport::new(failures))
            .with_options(MetricsSinkOptions {
                upload_interval: Duration::from_secs(60),
                engine: ReliableSinkOptions {
                    attempt_limit: 3,
                    backoff_interval: 0,
                    flush_delay: Duration::ZERO,
                    queue_capacity: 16,
                },
            })
            .build(|aggregated| {
                aggregated
                    .iter()
                    .map(|(name, value)| (name.clone(), value.value))
                    .collect()
            })
    }

    #[tokio::test]
    async fn test_pull_aggregate_upload() {
        let sink = Arc::new(fast_sink(0));
        sink.register_data_source(Arc::new(FixedSource {
            metrics: vec![
                counter("ServiceSuccess", "k1", 2.0),
                counter("ServiceSuccess", "k2", 5.0),
            ],
        }));

        sink.poll_once().await;

        let batches = sink.engine().transport().batches.lock().clone();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0]["ServiceSuccess"], 7.0);
        assert_eq!(sink.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_then_flush_recovers() {
        let sink = Arc::new(fast_sink(3));
        sink.register_data_source(Arc::new(FixedSource {
            metrics: vec![counter("ServiceSuccess", "k1", 1.0)],
        }));

        // Three in-flight failures demote the batch; the flush in the
        // same cycle then drains it against a recovered transport.
        sink.poll_once().await;

        let counters = sink.engine().counters().snapshot();
        assert_eq!(counters.recoverable_service_errors, 3);
        assert_eq!(counters.service_success, 1);
        assert_eq!(sink.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_empty_cycle_sends_nothing() {
        let sink = Arc::new(fast_sink(0));
        sink.poll_once().await;
        assert!(sink.engine().transport().batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stop_empties_queue_and_double_stop_is_noop() {
        let sink = Arc::new(fast_sink(u32::MAX));
        sink.register_data_source(Arc::new(FixedSource {
            metrics: vec![counter("ServiceSuccess", "k1", 1.0)],
        }));

        sink.start().await.unwrap();
        sink.poll_once().await;
        assert_eq!(sink.queue_len(), 1);

        sink.stop().await.unwrap();
        assert_eq!(sink.queue_len(), 0);
        sink.stop().await.unwrap();
    }
}
