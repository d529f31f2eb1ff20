//! Configuration file loader and change monitor.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::AgentConfig;
use super::validation::validate_config;

/// Configuration loader with search-path resolution and environment
/// variable expansion.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Creates a loader with no search paths.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Adds a search path for configuration files.
    pub fn add_search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.add_search_path(cwd)
        } else {
            self
        }
    }

    /// Adds the user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.add_search_path(config_dir.join("caravel"))
        } else {
            self
        }
    }

    /// Loads configuration from the first available source, falling back
    /// to defaults when no file is found.
    pub fn load(&self) -> ConfigResult<AgentConfig> {
        if let Some(path) = self.find_config_file() {
            return self.load_from_file(&path);
        }

        info!("No configuration file found, using defaults");
        Ok(AgentConfig::default())
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<AgentConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config = self.parse_yaml(&content)?;
        validate_config(&config)?;

        debug!(
            sources = config.sources.len(),
            sinks = config.sinks.len(),
            pipes = config.pipes.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(&self, yaml: &str) -> ConfigResult<AgentConfig> {
        let config = self.parse_yaml(yaml)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Finds the first available configuration file.
    pub fn find_config_file(&self) -> Option<PathBuf> {
        const CONFIG_NAMES: &[&str] = &[
            "caravel.yaml",
            "caravel.yml",
            "agent.yaml",
            "agent.yml",
            ".caravel.yaml",
            ".caravel.yml",
        ];

        for search_path in &self.search_paths {
            for name in CONFIG_NAMES {
                let path = search_path.join(name);
                debug!("Checking for config file: {}", path.display());
                if path.exists() {
                    info!("Found configuration file: {}", path.display());
                    return Some(path);
                }
            }
        }

        None
    }

    /// Parses YAML content with environment variable expansion.
    fn parse_yaml(&self, content: &str) -> ConfigResult<AgentConfig> {
        let expanded = expand_env_vars(content);
        serde_yaml::from_str(&expanded).map_err(ConfigError::from)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().with_current_dir().with_user_config_dir()
    }
}

/// Expands environment variables in the format `${VAR_NAME}` or
/// `${VAR_NAME:-default}`.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(:-([^}]*))?\}").unwrap();

    for cap in re.captures_iter(content) {
        let full_match = cap.get(0).unwrap().as_str();
        let var_name = cap.get(1).unwrap().as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = std::env::var(var_name)
            .ok()
            .or_else(|| default_value.map(String::from))
            .unwrap_or_default();

        result = result.replace(full_match, &value);
    }

    result
}

/// Last-modified time of the configuration document.
///
/// The reload tick compares this against the time of the last successful
/// load; richer change notification is left to external watchers.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_yaml() {
        let loader = ConfigLoader::new();
        let config = loader.load_from_str("").unwrap();
        assert!(config.sources.is_empty());
        assert!(config.sinks.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
Sources:
  - Id: s1
    SourceType: TestSource
SelfUpdate: 60
"#;
        let loader = ConfigLoader::new();
        let config = loader.load_from_str(yaml).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.self_update, 60);
    }

    #[test]
    fn test_env_var_expansion_with_default() {
        let loader = ConfigLoader::new();
        let yaml = r#"
Sinks:
  - Id: k1
    SinkType: TestSink
    Region: ${CARAVEL_TEST_NONEXISTENT_REGION:-eu-west-1}
"#;
        let config = loader.load_from_str(yaml).unwrap();
        assert_eq!(config.sinks[0].settings["Region"], "eu-west-1");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = ConfigLoader::new();
        let result = loader.load_from_file("/nonexistent/caravel.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
