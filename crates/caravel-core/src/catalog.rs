//! Factory catalogs and provider discovery.
//!
//! There is one [`FactoryCatalog`] per component kind. Factory providers
//! contribute themselves through the [`FACTORY_PROVIDERS`] distributed
//! slice; at agent start the runtime walks the slice and asks each
//! provider to register its factories into the [`CatalogSet`]. A provider
//! that fails is isolated — it is logged and counted, and the walk
//! continues with the rest.
//!
//! Type-name lookup is case-insensitive; registration is last-writer-wins;
//! an unknown or blank name is simply "not found", never an error.

use std::collections::HashMap;
use std::sync::Arc;

use linkme::distributed_slice;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::component::{BoxedPipe, BoxedPlugin, BoxedSink, BoxedSource};
use crate::context::PluginContext;
use crate::credentials::BoxedCredentialProvider;
use crate::parser::BoxedRecordParser;

/// A component factory: given the resolved type name and a plugin context,
/// produces an instance of kind `K`.
pub type Factory<K> = Arc<dyn Fn(&str, Arc<PluginContext>) -> anyhow::Result<K> + Send + Sync>;

/// Case-insensitive name → factory registry for one component kind.
pub struct FactoryCatalog<K> {
    entries: RwLock<HashMap<String, Factory<K>>>,
}

impl<K> FactoryCatalog<K> {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a factory under `type_name`.
    ///
    /// Re-registering an existing name replaces the previous factory.
    pub fn register<F>(&self, type_name: &str, factory: F)
    where
        F: Fn(&str, Arc<PluginContext>) -> anyhow::Result<K> + Send + Sync + 'static,
    {
        let key = type_name.to_lowercase();
        if self.entries.write().insert(key, Arc::new(factory)).is_some() {
            debug!(type_name, "Factory re-registered, last registration wins");
        }
    }

    /// Looks up a factory. Blank and unknown names return `None`.
    pub fn get(&self, type_name: &str) -> Option<Factory<K>> {
        let trimmed = type_name.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.entries.read().get(&trimmed.to_lowercase()).cloned()
    }

    /// Resolves a factory and invokes it, or `None` when the name is
    /// unknown.
    pub fn create(&self, type_name: &str, ctx: Arc<PluginContext>) -> Option<anyhow::Result<K>> {
        self.get(type_name).map(|factory| factory(type_name, ctx))
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when no factories are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K> Default for FactoryCatalog<K> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Catalog Set & Provider Discovery
// =============================================================================

/// The full set of catalogs, one per component kind.
pub struct CatalogSet {
    pub sources: FactoryCatalog<BoxedSource>,
    pub sinks: FactoryCatalog<BoxedSink>,
    pub pipes: FactoryCatalog<BoxedPipe>,
    pub credentials: FactoryCatalog<BoxedCredentialProvider>,
    pub plugins: FactoryCatalog<BoxedPlugin>,
    /// Behind an `Arc` so the runtime can expose a read-only view through
    /// the plugin-context side channel.
    pub parsers: Arc<FactoryCatalog<BoxedRecordParser>>,
}

impl CatalogSet {
    /// Creates an empty catalog set.
    pub fn new() -> Self {
        Self {
            sources: FactoryCatalog::new(),
            sinks: FactoryCatalog::new(),
            pipes: FactoryCatalog::new(),
            credentials: FactoryCatalog::new(),
            plugins: FactoryCatalog::new(),
            parsers: Arc::new(FactoryCatalog::new()),
        }
    }

    /// Walks the [`FACTORY_PROVIDERS`] slice, asking each provider to
    /// register itself. A failing provider does not prevent the others
    /// from loading.
    pub fn discover(&self) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        for provider in FACTORY_PROVIDERS.iter() {
            match (provider.register)(self) {
                Ok(()) => {
                    debug!(provider = provider.name, "Factory provider registered");
                    outcome.providers_loaded += 1;
                }
                Err(e) => {
                    warn!(
                        provider = provider.name,
                        error = %e,
                        "Factory provider failed to register"
                    );
                    outcome.providers_failed += 1;
                }
            }
        }
        outcome
    }

    /// Per-kind factory counts, for the self-metrics publication.
    pub fn loaded_counts(&self) -> [(&'static str, usize); 6] {
        [
            ("source", self.sources.len()),
            ("sink", self.sinks.len()),
            ("pipe", self.pipes.len()),
            ("credential", self.credentials.len()),
            ("plugin", self.plugins.len()),
            ("parser", self.parsers.len()),
        ]
    }
}

impl Default for CatalogSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a [`CatalogSet::discover`] walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Providers that registered successfully.
    pub providers_loaded: usize,
    /// Providers whose registration failed.
    pub providers_failed: usize,
}

/// A factory provider contributed by a plugin crate.
pub struct FactoryProvider {
    /// Provider name, for diagnostics.
    pub name: &'static str,
    /// Registration hook invoked during discovery.
    pub register: fn(&CatalogSet) -> anyhow::Result<()>,
}

/// Registry of factory providers. Each crate that ships components
/// contributes one entry via `#[distributed_slice(FACTORY_PROVIDERS)]`.
#[distributed_slice]
pub static FACTORY_PROVIDERS: [FactoryProvider];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Source, BoxedSource};
    use crate::error::ComponentResult;
    use async_trait::async_trait;

    struct NullSource {
        id: String,
    }

    #[async_trait]
    impl Source for NullSource {
        fn id(&self) -> &str {
            &self.id
        }

        async fn start(&self) -> ComponentResult<()> {
            Ok(())
        }

        async fn stop(&self) -> ComponentResult<()> {
            Ok(())
        }
    }

    fn null_factory(catalog: &FactoryCatalog<BoxedSource>, type_name: &str) {
        catalog.register(type_name, |_, ctx| {
            Ok(Arc::new(NullSource {
                id: ctx.id().unwrap_or_default().to_string(),
            }) as BoxedSource)
        });
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = FactoryCatalog::new();
        null_factory(&catalog, "DirectorySource");

        assert!(catalog.get("directorysource").is_some());
        assert!(catalog.get("DIRECTORYSOURCE").is_some());
        assert!(catalog.get("DirectorySource").is_some());
    }

    #[test]
    fn test_blank_and_unknown_names_are_not_found() {
        let catalog: FactoryCatalog<BoxedSource> = FactoryCatalog::new();
        assert!(catalog.get("").is_none());
        assert!(catalog.get("   ").is_none());
        assert!(catalog.get("nope").is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let catalog: FactoryCatalog<BoxedSource> = FactoryCatalog::new();
        catalog.register("S", |_, _| anyhow::bail!("first"));
        null_factory(&catalog, "s");
        assert_eq!(catalog.len(), 1);

        let ctx = Arc::new(PluginContext::empty());
        let created = catalog.create("S", ctx).unwrap();
        assert!(created.is_ok());
    }
}
