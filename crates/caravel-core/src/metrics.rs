//! Metric model and the self-metrics publication contract.
//!
//! Metrics are keyed by `(name, category, dimensions)` and carry a numeric
//! value, a unit, and a counter type. Components publish batches of
//! counters through the shared [`MetricsPublisher`] handed to them in their
//! plugin context; the self-metrics source accumulates those publications
//! and serves them to metrics sinks.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// How a published value combines with what was published before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterType {
    /// The value replaces the previous one.
    CurrentValue,
    /// The value is added to the previous one.
    Increment,
    /// The value is one sample of a running average.
    Average,
}

/// Unit attached to a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    #[default]
    Count,
    Milliseconds,
    Seconds,
    Bytes,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Bytes => "bytes",
        }
    }
}

impl std::fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a metric: name, category, and free-form dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub name: String,
    pub category: String,
    pub dimensions: BTreeMap<String, String>,
}

impl MetricKey {
    /// Creates a dimensionless key.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            dimensions: BTreeMap::new(),
        }
    }

    /// Adds a dimension.
    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category, self.name)?;
        for (key, value) in &self.dimensions {
            write!(f, "[{key}={value}]")?;
        }
        Ok(())
    }
}

/// A metric's numeric value plus unit and combination rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    pub value: f64,
    pub unit: MetricUnit,
    pub counter_type: CounterType,
}

impl MetricValue {
    /// A plain count with the given counter type.
    pub fn count(value: f64, counter_type: CounterType) -> Self {
        Self {
            value,
            unit: MetricUnit::Count,
            counter_type,
        }
    }

    /// A latency sample in milliseconds.
    pub fn latency_ms(value: f64) -> Self {
        Self {
            value,
            unit: MetricUnit::Milliseconds,
            counter_type: CounterType::Average,
        }
    }
}

/// A keyed metric value, the unit of data-pull queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub key: MetricKey,
    pub value: MetricValue,
}

/// Payload of the periodic snapshot envelopes the self-metrics source
/// emits to its event-stream subscribers.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub metrics: Vec<Metric>,
}

/// Publication side of the self-metrics source.
///
/// `id` scopes the batch to the publishing component (recorded as a
/// dimension when non-blank); `category` groups related counters.
pub trait MetricsPublisher: Send + Sync {
    fn publish(
        &self,
        id: &str,
        category: &str,
        counter_type: CounterType,
        entries: HashMap<String, MetricValue>,
    );
}

/// Standard counter names and categories published by the runtime.
pub mod counters {
    /// Category carrying the agent's own operational counters.
    pub const CATEGORY_PROGRAM: &str = "Program";
    /// Category carrying per-sink transport counters.
    pub const CATEGORY_SINKS: &str = "Sinks";

    pub const FACTORIES_LOADED: &str = "FactoriesLoaded";
    pub const FACTORIES_FAILED_TO_LOAD: &str = "FactoriesFailedToLoad";
    pub const SOURCES_STARTED: &str = "SourcesStarted";
    pub const SOURCES_FAILED_TO_START: &str = "SourcesFailedToStart";
    pub const SINKS_STARTED: &str = "SinksStarted";
    pub const SINKS_FAILED_TO_START: &str = "SinksFailedToStart";
    pub const PIPES_CONNECTED: &str = "PipesConnected";
    pub const PIPES_FAILED_TO_CONNECT: &str = "PipesFailedToConnect";
    pub const PLUGINS_STARTED: &str = "PluginsStarted";
    pub const PLUGINS_FAILED_TO_START: &str = "PluginsFailedToStart";
    pub const CREDENTIALS_LOADED: &str = "CredentialProvidersLoaded";
    pub const CREDENTIALS_FAILED_TO_LOAD: &str = "CredentialProvidersFailedToLoad";
    pub const CONFIG_RELOAD_SUCCESS: &str = "ConfigReloadSuccess";
    pub const CONFIG_RELOAD_FAILURE: &str = "ConfigReloadFailure";
    pub const BUILD_NUMBER: &str = "BuildNumber";
    pub const SELF_UPDATE_FREQUENCY: &str = "SelfUpdateFrequency";

    pub const SERVICE_SUCCESS: &str = "ServiceSuccess";
    pub const RECOVERABLE_SERVICE_ERRORS: &str = "RecoverableServiceErrors";
    pub const NONRECOVERABLE_SERVICE_ERRORS: &str = "NonrecoverableServiceErrors";
    pub const LATENCY: &str = "Latency";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = MetricKey::new("SourcesStarted", "Program").with_dimension("id", "tail-1");
        assert_eq!(key.to_string(), "Program/SourcesStarted[id=tail-1]");
    }

    #[test]
    fn test_key_identity_includes_dimensions() {
        let bare = MetricKey::new("Latency", "Sinks");
        let dimensioned = bare.clone().with_dimension("id", "k1");
        assert_ne!(bare, dimensioned);
    }
}
