//! Per-component plugin contexts and the parameter store.
//!
//! Every component is constructed through its factory with a
//! [`PluginContext`]: the component's own configuration section, a tracing
//! span bound to its id, the shared self-metrics publisher, a read-only
//! view of the credential registry, the parameter store, and a typed
//! side-channel map the binder uses to pass data between itself and pipe
//! constructors (upstream/downstream payload types, the record-parser
//! catalog).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Span;

use crate::credentials::CredentialRegistry;
use crate::metrics::{CounterType, MetricValue, MetricsPublisher};

/// Conventional parameter-store keys written by the runtime at start.
pub mod parameter_keys {
    /// Directory the active configuration document was loaded from.
    pub const CONFIG_DIR: &str = "ConfigDir";
    /// Path of the structured-log configuration file, when one is in use.
    pub const LOG_CONFIG_PATH: &str = "LogConfigPath";
    /// Directory components may use for their bookmark files; layout is
    /// component-owned.
    pub const BOOKMARKS_DIR: &str = "BookmarksDir";
}

/// Well-known keys in the context side-channel map.
pub mod context_keys {
    /// `&'static str`: payload type emitted by the upstream source.
    pub const SOURCE_PAYLOAD_TYPE: &str = "SourcePayloadType";
    /// `&'static str`: payload type accepted by the downstream sink.
    pub const SINK_PAYLOAD_TYPE: &str = "SinkPayloadType";
    /// [`FactoryCatalog<BoxedRecordParser>`](crate::catalog::FactoryCatalog):
    /// read-only view of the record-parser catalog.
    pub const PARSER_CATALOG: &str = "ParserCatalog";
}

// =============================================================================
// Parameter Store
// =============================================================================

/// Key/value persistence shared by all components.
///
/// The backing store is host-defined; the in-memory implementation is the
/// default and is also what tests use.
pub trait ParameterStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: String);
}

/// Non-persistent parameter store.
#[derive(Default)]
pub struct MemoryParameterStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParameterStore for MemoryParameterStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }
}

// =============================================================================
// Plugin Context
// =============================================================================

/// Per-component handle bundling everything a factory needs.
pub struct PluginContext {
    config: serde_json::Value,
    id: Option<String>,
    span: Span,
    metrics: Arc<dyn MetricsPublisher>,
    credentials: Arc<CredentialRegistry>,
    parameters: Arc<dyn ParameterStore>,
    data: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl PluginContext {
    /// Creates a context for one component section.
    ///
    /// `span` should be bound to the component id; when the section
    /// declares no id, pass the manager's own span.
    pub fn new(
        config: serde_json::Value,
        id: Option<String>,
        span: Span,
        metrics: Arc<dyn MetricsPublisher>,
        credentials: Arc<CredentialRegistry>,
        parameters: Arc<dyn ParameterStore>,
    ) -> Self {
        Self {
            config,
            id,
            span,
            metrics,
            credentials,
            parameters,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// A context with no configuration and no-op collaborators, for tests
    /// and standalone component construction.
    pub fn empty() -> Self {
        Self::new(
            serde_json::Value::Object(serde_json::Map::new()),
            None,
            Span::none(),
            Arc::new(NullMetricsPublisher),
            Arc::new(CredentialRegistry::new()),
            Arc::new(MemoryParameterStore::new()),
        )
    }

    /// The component's raw configuration section.
    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Deserializes the configuration section into a typed struct.
    pub fn extract<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.config.clone())
    }

    /// The component id from the section, if declared.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The tracing span bound to this component.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The shared self-metrics publisher.
    pub fn metrics(&self) -> &Arc<dyn MetricsPublisher> {
        &self.metrics
    }

    /// Read-only view of the credential-provider registry.
    pub fn credentials(&self) -> &Arc<CredentialRegistry> {
        &self.credentials
    }

    /// The shared parameter store.
    pub fn parameters(&self) -> &Arc<dyn ParameterStore> {
        &self.parameters
    }

    /// Stores a typed side-channel entry.
    pub fn set_data<T: Any + Send + Sync>(&self, key: &str, value: Arc<T>) {
        self.data.write().insert(key.to_string(), value);
    }

    /// Reads a typed side-channel entry, `None` when absent or of another
    /// type.
    pub fn data<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self.data.read().get(key).cloned()?;
        entry.downcast().ok()
    }
}

/// Discards every publication. Used by [`PluginContext::empty`].
pub struct NullMetricsPublisher;

impl MetricsPublisher for NullMetricsPublisher {
    fn publish(
        &self,
        _id: &str,
        _category: &str,
        _counter_type: CounterType,
        _entries: HashMap<String, MetricValue>,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_channel_roundtrip() {
        let ctx = PluginContext::empty();
        ctx.set_data(context_keys::SOURCE_PAYLOAD_TYPE, Arc::new("alloc::string::String"));

        let stored: Arc<&str> = ctx.data(context_keys::SOURCE_PAYLOAD_TYPE).unwrap();
        assert_eq!(*stored, "alloc::string::String");

        // Wrong type comes back as None, not a panic.
        assert!(ctx.data::<u64>(context_keys::SOURCE_PAYLOAD_TYPE).is_none());
        assert!(ctx.data::<&str>("missing").is_none());
    }

    #[test]
    fn test_extract_typed_config() {
        #[derive(serde::Deserialize)]
        struct TailConfig {
            #[serde(rename = "Path")]
            path: String,
        }

        let ctx = PluginContext::new(
            serde_json::json!({"Id": "tail-1", "Path": "/var/log/syslog"}),
            Some("tail-1".to_string()),
            Span::none(),
            Arc::new(NullMetricsPublisher),
            Arc::new(CredentialRegistry::new()),
            Arc::new(MemoryParameterStore::new()),
        );

        let config: TailConfig = ctx.extract().unwrap();
        assert_eq!(config.path, "/var/log/syslog");
        assert_eq!(ctx.id(), Some("tail-1"));
    }

    #[test]
    fn test_parameter_store() {
        let store = MemoryParameterStore::new();
        assert!(store.get(parameter_keys::CONFIG_DIR).is_none());
        store.set(parameter_keys::CONFIG_DIR, "/etc/caravel".to_string());
        assert_eq!(store.get(parameter_keys::CONFIG_DIR).as_deref(), Some("/etc/caravel"));
    }
}
