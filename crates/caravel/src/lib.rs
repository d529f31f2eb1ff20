//! # Caravel
//!
//! A pluggable host-agent runtime. Caravel collects events from a machine
//! — log files, OS event logs, traces, metrics — and forwards them to
//! remote ingestion services through a pipeline of **sources**, **pipes**,
//! and **sinks** assembled from declarative configuration.
//!
//! This crate is the facade: it re-exports the three layers.
//!
//! - [`caravel_core`]: envelopes, component traits, catalogs, contexts
//! - [`caravel_sinks`]: the reliable retry/flush engine and built-in sinks
//! - [`caravel_runtime`]: the lifecycle manager and configuration layer
//!
//! ```rust,ignore
//! use caravel::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = AgentManager::new();
//!     manager.set_config_file("/etc/caravel/caravel.yaml");
//!     manager.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     manager.stop_with(true).await;
//!     Ok(())
//! }
//! ```

pub use caravel_core as core;
pub use caravel_runtime as runtime;
pub use caravel_sinks as sinks;

pub use caravel_core::{
    BoxedEnvelope, CatalogSet, ComponentError, ComponentResult, CounterType, Envelope,
    FactoryCatalog, Metric, MetricKey, MetricValue, MetricsPublisher, PluginContext, Subscription,
};
pub use caravel_runtime::{AgentManager, ConfigLoader, LoggingBuilder};
pub use caravel_sinks::{ReliableSink, ReliableSinkOptions, RetryQueue, UploadError, UploadTransport};

/// Prelude for common imports.
pub mod prelude {
    pub use caravel_core::prelude::*;
    pub use caravel_runtime::{AgentManager, ConfigLoader, LoggingBuilder, UpdateTrigger};
    pub use caravel_sinks::{
        MetricsSinkBuilder, ReliableSink, ReliableSinkOptions, UploadError, UploadTransport,
    };
}
