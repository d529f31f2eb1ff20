//! Configuration: schema, loading, and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{modified_time, ConfigLoader};
pub use schema::{
    extract_section, section_or_empty, AgentConfig, CredentialEntry, MetricsSection, PipeEntry,
    PluginEntry, SinkEntry, SourceEntry,
};
pub use validation::validate_config;
