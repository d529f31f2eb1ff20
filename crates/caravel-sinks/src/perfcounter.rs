//! Built-in performance-counter sink.
//!
//! Subscribes to the self-metrics snapshot stream and maintains a gauge
//! board of current values. Publishing the board into a platform
//! counter facility is host-specific and out of scope; hosts read the
//! board through [`PerformanceCounterSink::gauges`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use caravel_core::component::{EventSink, Sink};
use caravel_core::envelope::BoxedEnvelope;
use caravel_core::error::ComponentResult;
use caravel_core::metrics::{MetricKey, MetricsSnapshot};
use parking_lot::RwLock;
use tracing::trace;

/// Reserved type name of the built-in performance-counter sink.
pub const PERFORMANCE_COUNTER_SINK_TYPE: &str = "PerformanceCounter";

/// Gauge board over the latest self-metrics snapshot.
pub struct PerformanceCounterSink {
    id: String,
    gauges: RwLock<HashMap<MetricKey, f64>>,
}

impl PerformanceCounterSink {
    /// Creates the sink under the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gauges: RwLock::new(HashMap::new()),
        }
    }

    /// A copy of the current gauge board.
    pub fn gauges(&self) -> HashMap<MetricKey, f64> {
        self.gauges.read().clone()
    }
}

#[async_trait]
impl Sink for PerformanceCounterSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> ComponentResult<()> {
        Ok(())
    }

    async fn stop(&self) -> ComponentResult<()> {
        self.gauges.write().clear();
        Ok(())
    }

    fn event_sink(self: Arc<Self>) -> Option<Arc<dyn EventSink>> {
        Some(self)
    }
}

impl EventSink for PerformanceCounterSink {
    fn payload_type(&self) -> &'static str {
        std::any::type_name::<MetricsSnapshot>()
    }

    fn on_envelope(&self, envelope: BoxedEnvelope) {
        let Some(snapshot) = envelope.downcast_ref::<MetricsSnapshot>() else {
            return;
        };
        let mut gauges = self.gauges.write();
        for metric in &snapshot.metrics {
            gauges.insert(metric.key.clone(), metric.value.value);
        }
        trace!(id = %self.id, gauges = gauges.len(), "Gauge board updated");
    }
}
