//! Configuration schema for the agent.
//!
//! The document is YAML with PascalCase section names. Beyond the fields
//! the runtime understands, every component entry keeps its remaining keys
//! as a raw section that is handed to the component's factory through the
//! plugin context — the runtime never interprets component-specific
//! settings. Unknown top-level keys are ignored; type names match
//! case-insensitively, ids case-sensitively.
//!
//! ```yaml
//! Sources:
//!   - Id: syslog
//!     SourceType: DirectorySource
//!     Path: /var/log
//! Sinks:
//!   - Id: metrics-up
//!     SinkType: CloudWatch
//! Pipes:
//!   - Id: p1
//!     SourceRef: syslog
//!     SinkRef: metrics-up
//! SelfUpdate: 1440
//! ```

use serde::{Deserialize, Serialize};

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AgentConfig {
    /// Source declarations; constructed but not started until pipes bind.
    pub sources: Vec<SourceEntry>,

    /// Sink declarations; constructed and started during load.
    pub sinks: Vec<SinkEntry>,

    /// Pipe declarations binding sources to sinks.
    pub pipes: Vec<PipeEntry>,

    /// Credential provider declarations.
    pub credentials: Vec<CredentialEntry>,

    /// Generic plugin declarations.
    pub plugins: Vec<PluginEntry>,

    /// Self-metrics source settings.
    pub metrics: MetricsSection,

    /// Telemetry sink settings (raw; interpreted by the telemetry sink).
    pub telemetrics: serde_json::Value,

    /// Performance-counter sink settings (raw).
    pub performance_counter: serde_json::Value,

    /// Self-update cadence in minutes; 0 disables.
    pub self_update: u64,

    /// Config-watch tick in seconds.
    pub config_interval: u64,

    /// Render full error chains in logs.
    pub detailed_errors: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            sinks: Vec::new(),
            pipes: Vec::new(),
            credentials: Vec::new(),
            plugins: Vec::new(),
            metrics: MetricsSection::default(),
            telemetrics: serde_json::Value::Null,
            performance_counter: serde_json::Value::Null,
            self_update: 0,
            config_interval: default_config_interval(),
            detailed_errors: false,
        }
    }
}

fn default_config_interval() -> u64 {
    10
}

/// Self-metrics source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MetricsSection {
    /// Snapshot cadence in seconds.
    pub interval_seconds: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
        }
    }
}

// =============================================================================
// Component Entries
// =============================================================================

/// One `Sources` entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct SourceEntry {
    pub id: String,
    pub source_type: String,
    /// Everything else in the entry, passed to the factory untouched.
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl SourceEntry {
    /// The full entry as the component's configuration section.
    pub fn section(&self) -> serde_json::Value {
        let mut map = self.settings.clone();
        map.insert("Id".into(), serde_json::json!(self.id));
        map.insert("SourceType".into(), serde_json::json!(self.source_type));
        serde_json::Value::Object(map)
    }
}

/// One `Sinks` entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct SinkEntry {
    pub id: String,
    pub sink_type: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl SinkEntry {
    /// The full entry as the component's configuration section.
    pub fn section(&self) -> serde_json::Value {
        let mut map = self.settings.clone();
        map.insert("Id".into(), serde_json::json!(self.id));
        map.insert("SinkType".into(), serde_json::json!(self.sink_type));
        serde_json::Value::Object(map)
    }
}

/// One `Pipes` entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct PipeEntry {
    pub id: String,
    /// Upstream source id; absent means a declaration-only pipe.
    pub source_ref: Option<String>,
    /// Downstream sink id; required.
    pub sink_ref: Option<String>,
    /// Pipe type for a transforming pipe; absent means direct wiring.
    #[serde(rename = "Type")]
    pub pipe_type: Option<String>,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl PipeEntry {
    /// The full entry as the pipe's configuration section.
    pub fn section(&self) -> serde_json::Value {
        let mut map = self.settings.clone();
        map.insert("Id".into(), serde_json::json!(self.id));
        if let Some(pipe_type) = &self.pipe_type {
            map.insert("Type".into(), serde_json::json!(pipe_type));
        }
        serde_json::Value::Object(map)
    }
}

/// One `Credentials` entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct CredentialEntry {
    pub id: String,
    pub credential_type: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl CredentialEntry {
    /// The full entry as the provider's configuration section.
    pub fn section(&self) -> serde_json::Value {
        let mut map = self.settings.clone();
        map.insert("Id".into(), serde_json::json!(self.id));
        map.insert(
            "CredentialType".into(),
            serde_json::json!(self.credential_type),
        );
        serde_json::Value::Object(map)
    }
}

/// One `Plugins` entry. Plugins are keyed by type, not id.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct PluginEntry {
    #[serde(rename = "Type")]
    pub plugin_type: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl PluginEntry {
    /// The full entry as the plugin's configuration section.
    pub fn section(&self) -> serde_json::Value {
        let mut map = self.settings.clone();
        map.insert("Type".into(), serde_json::json!(self.plugin_type));
        serde_json::Value::Object(map)
    }
}

// =============================================================================
// Section Extraction
// =============================================================================

/// Extracts a typed view of a raw section.
///
/// A null/absent section extracts as the type's defaults.
///
/// # Example
///
/// ```rust,ignore
/// let telemetry: TelemetryConfig = extract_section(&config.telemetrics)?;
/// ```
pub fn extract_section<T: serde::de::DeserializeOwned>(
    section: &serde_json::Value,
) -> Result<T, figment::Error> {
    let value = if section.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        section.clone()
    };
    figment::Figment::from(figment::providers::Serialized::defaults(value)).extract()
}

/// A raw section as a JSON object, empty when the section is null.
pub fn section_or_empty(section: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match section {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_keeps_extra_settings() {
        let yaml = r#"
Sources:
  - Id: syslog
    SourceType: DirectorySource
    Path: /var/log
    Filter: "*.log"
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sources.len(), 1);

        let entry = &config.sources[0];
        assert_eq!(entry.id, "syslog");
        assert_eq!(entry.source_type, "DirectorySource");
        assert_eq!(entry.settings["Path"], "/var/log");

        let section = entry.section();
        assert_eq!(section["Id"], "syslog");
        assert_eq!(section["Filter"], "*.log");
    }

    #[test]
    fn test_unknown_top_level_keys_are_ignored() {
        let yaml = r#"
Sinks:
  - Id: k1
    SinkType: TestSink
SomethingElse:
  nested: true
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sinks.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.config_interval, 10);
        assert_eq!(config.self_update, 0);
        assert_eq!(config.metrics.interval_seconds, 60);
        assert!(config.telemetrics.is_null());
    }

    #[test]
    fn test_pipe_entry_type_alias() {
        let yaml = r#"
Pipes:
  - Id: p1
    SourceRef: s1
    SinkRef: k1
    Type: EMF
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        let pipe = &config.pipes[0];
        assert_eq!(pipe.pipe_type.as_deref(), Some("EMF"));
        assert_eq!(pipe.source_ref.as_deref(), Some("s1"));
        assert_eq!(pipe.sink_ref.as_deref(), Some("k1"));
    }

    #[test]
    fn test_extract_null_section_yields_defaults() {
        #[derive(serde::Deserialize, Default)]
        #[serde(default, rename_all = "PascalCase")]
        struct PerfConfig {
            enabled: bool,
        }

        let config = AgentConfig::default();
        let perf: PerfConfig = extract_section(&config.performance_counter).unwrap();
        assert!(!perf.enabled);
    }
}
