//! # Caravel Runtime
//!
//! The lifecycle layer of the Caravel host agent: declarative
//! configuration in, a live pipeline of sources, pipes, and sinks out.
//!
//! [`AgentManager`] drives everything:
//!
//! 1. loads and validates the YAML configuration document;
//! 2. discovers factory providers and fills the per-kind catalogs;
//! 3. constructs credential providers, sinks, sources, and plugins from
//!    their sections, containing every per-entry failure;
//! 4. binds pipes — direct subscriptions, transforming pipes, or
//!    data-pull couplings — and starts the sources;
//! 5. watches the document and hot-reloads with a full stop/start cycle;
//! 6. publishes its own operational counters through the self-metrics
//!    source.
//!
//! ```rust,ignore
//! use caravel_runtime::AgentManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = AgentManager::new();
//!     manager.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     manager.stop_with(true).await;
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod selfmetrics;
pub mod selfupdate;

pub use binder::{bind_pipe, BindDisposition};
pub use config::{
    modified_time, validate_config, AgentConfig, ConfigError, ConfigLoader, ConfigResult,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use manager::{
    AgentManager, PERFORMANCE_COUNTER_SINK_ID, TELEMETRY_SINK_ID,
};
pub use registry::{PipelineRegistry, PipelineStats};
pub use selfmetrics::{SelfMetricsSource, SELF_METRICS_SOURCE_ID};
pub use selfupdate::{SelfUpdater, UpdateTrigger};
