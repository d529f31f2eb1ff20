//! Component registry for one pipeline generation.
//!
//! Everything constructed during a load cycle lives here: sources, sinks,
//! pipes, plugins, and the subscription tokens wiring them together. The
//! registry is mutated only by the manager under its single-writer
//! discipline; a reload fully stops and drains the old generation before
//! the next one is constructed, so partial-state pipelines are never
//! observable.

use std::collections::HashMap;

use anyhow::bail;
use caravel_core::component::{BoxedPipe, BoxedPlugin, BoxedSink, BoxedSource};
use caravel_core::subscription::Subscription;

/// One generation of constructed components.
#[derive(Default)]
pub struct PipelineRegistry {
    sources: HashMap<String, BoxedSource>,
    sinks: HashMap<String, BoxedSink>,
    pipes: HashMap<String, BoxedPipe>,
    plugins: Vec<BoxedPlugin>,
    subscriptions: Vec<Subscription>,
}

impl PipelineRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source; ids are unique per kind.
    pub fn insert_source(&mut self, id: &str, source: BoxedSource) -> anyhow::Result<()> {
        if self.sources.contains_key(id) {
            bail!("source with id '{id}' is already registered");
        }
        self.sources.insert(id.to_string(), source);
        Ok(())
    }

    /// Registers a sink; ids are unique per kind.
    pub fn insert_sink(&mut self, id: &str, sink: BoxedSink) -> anyhow::Result<()> {
        if self.sinks.contains_key(id) {
            bail!("sink with id '{id}' is already registered");
        }
        self.sinks.insert(id.to_string(), sink);
        Ok(())
    }

    /// Registers a pipe; ids are unique per kind.
    pub fn insert_pipe(&mut self, id: &str, pipe: BoxedPipe) -> anyhow::Result<()> {
        if self.pipes.contains_key(id) {
            bail!("pipe with id '{id}' is already registered");
        }
        self.pipes.insert(id.to_string(), pipe);
        Ok(())
    }

    /// Registers a plugin. Plugins have no id and no uniqueness rule.
    pub fn add_plugin(&mut self, plugin: BoxedPlugin) {
        self.plugins.push(plugin);
    }

    /// Takes ownership of a subscription token for the generation's
    /// lifetime.
    pub fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Looks up a source by id (case-sensitive).
    pub fn source(&self, id: &str) -> Option<BoxedSource> {
        self.sources.get(id).cloned()
    }

    /// Looks up a sink by id (case-sensitive).
    pub fn sink(&self, id: &str) -> Option<BoxedSink> {
        self.sinks.get(id).cloned()
    }

    /// Iterates sources as `(id, source)` pairs.
    pub fn sources(&self) -> impl Iterator<Item = (&String, &BoxedSource)> {
        self.sources.iter()
    }

    /// Removes and returns every source.
    pub fn drain_sources(&mut self) -> Vec<(String, BoxedSource)> {
        self.sources.drain().collect()
    }

    /// Removes and returns every sink.
    pub fn drain_sinks(&mut self) -> Vec<(String, BoxedSink)> {
        self.sinks.drain().collect()
    }

    /// Removes and returns every pipe.
    pub fn drain_pipes(&mut self) -> Vec<(String, BoxedPipe)> {
        self.pipes.drain().collect()
    }

    /// Removes and returns every plugin.
    pub fn drain_plugins(&mut self) -> Vec<BoxedPlugin> {
        std::mem::take(&mut self.plugins)
    }

    /// Removes and returns every subscription token. Dropping the result
    /// severs all links of the generation.
    pub fn drain_subscriptions(&mut self) -> Vec<Subscription> {
        std::mem::take(&mut self.subscriptions)
    }

    /// Returns statistics about the registry.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            sources: self.sources.len(),
            sinks: self.sinks.len(),
            pipes: self.pipes.len(),
            plugins: self.plugins.len(),
            subscriptions: self.subscriptions.len(),
        }
    }
}

/// Statistics about one pipeline generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Number of registered sources.
    pub sources: usize,
    /// Number of registered sinks.
    pub sinks: usize,
    /// Number of registered pipes.
    pub pipes: usize,
    /// Number of registered plugins.
    pub plugins: usize,
    /// Number of live subscriptions.
    pub subscriptions: usize,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sources, {} sinks, {} pipes, {} plugins, {} subscriptions",
            self.sources, self.sinks, self.pipes, self.plugins, self.subscriptions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use caravel_core::component::Source;
    use caravel_core::error::ComponentResult;
    use std::sync::Arc;

    struct NullSource;

    #[async_trait]
    impl Source for NullSource {
        fn id(&self) -> &str {
            "s1"
        }

        async fn start(&self) -> ComponentResult<()> {
            Ok(())
        }

        async fn stop(&self) -> ComponentResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut registry = PipelineRegistry::new();
        registry.insert_source("s1", Arc::new(NullSource)).unwrap();
        assert!(registry.insert_source("s1", Arc::new(NullSource)).is_err());
        assert_eq!(registry.stats().sources, 1);
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = PipelineRegistry::new();
        registry.insert_source("s1", Arc::new(NullSource)).unwrap();
        assert_eq!(registry.drain_sources().len(), 1);
        assert_eq!(registry.stats().sources, 0);
    }
}
