//! # Caravel Core
//!
//! The core dataflow model of the Caravel host agent.
//!
//! Caravel collects machine events (log files, OS event logs, traces,
//! metrics) and forwards them to remote ingestion services. This crate
//! defines the pieces the runtime composes into a live pipeline:
//!
//! - **Envelopes**: typed records with timestamp/bookmark/position
//!   metadata, type-erased for transport ([`Envelope`], [`BoxedEnvelope`])
//! - **Components**: sources, sinks, pipes, and plugins with small
//!   capability surfaces ([`Source`], [`Sink`], [`Pipe`], [`GenericPlugin`])
//! - **Subscriptions**: disposable observer tokens wiring sources to sinks
//!   ([`SubscriberHub`], [`Subscription`])
//! - **Catalogs**: case-insensitive factory registries with provider
//!   discovery ([`FactoryCatalog`], [`CatalogSet`])
//! - **Contexts**: the per-component construction handle
//!   ([`PluginContext`], [`ParameterStore`])
//! - **Metrics**: the metric model and publication contract
//!   ([`MetricKey`], [`MetricValue`], [`MetricsPublisher`])
//!
//! ```text
//! ┌────────┐      ┌────────┐      ┌────────┐
//! │ Source │─────▶│  Pipe  │─────▶│  Sink  │
//! └────────┘      └────────┘      └────────┘
//!      │       subscriptions          ▲
//!      └── self-metrics ──────────────┘
//! ```

pub mod catalog;
pub mod component;
pub mod context;
pub mod credentials;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod network;
pub mod parser;
pub mod subscription;

pub use catalog::{CatalogSet, DiscoveryOutcome, Factory, FactoryCatalog, FactoryProvider, FACTORY_PROVIDERS};
pub use component::{
    BoxedPipe, BoxedPlugin, BoxedSink, BoxedSource, DataSink, DataSource, EventSink, EventSource,
    GenericPlugin, Pipe, Sink, Source, ANY_PAYLOAD,
};
pub use context::{
    MemoryParameterStore, NullMetricsPublisher, ParameterStore, PluginContext, context_keys,
    parameter_keys,
};
pub use credentials::{BoxedCredentialProvider, Credential, CredentialProvider, CredentialRegistry};
pub use envelope::{BoxedEnvelope, Envelope};
pub use error::{ComponentError, ComponentResult};
pub use metrics::{
    counters, CounterType, Metric, MetricKey, MetricUnit, MetricValue, MetricsPublisher,
    MetricsSnapshot,
};
pub use parser::{BoxedRecordParser, ParsedRecord, RecordParser};
pub use subscription::{SubscriberHub, Subscription};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::component::{
        BoxedPipe, BoxedPlugin, BoxedSink, BoxedSource, DataSink, DataSource, EventSink,
        EventSource, GenericPlugin, Pipe, Sink, Source,
    };
    pub use crate::context::PluginContext;
    pub use crate::envelope::{BoxedEnvelope, Envelope};
    pub use crate::error::{ComponentError, ComponentResult};
    pub use crate::metrics::{CounterType, Metric, MetricKey, MetricValue, MetricsPublisher};
    pub use crate::subscription::{SubscriberHub, Subscription};
}
