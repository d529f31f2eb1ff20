//! Credential providers and their registry.
//!
//! Concrete providers (profile files, instance metadata, vaults) live in
//! plugin crates; the core only defines the contract and the registry that
//! components receive a read-only view of through their plugin context.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ComponentResult;

/// Opaque credential material: a set of named secrets.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    entries: HashMap<String, String>,
}

impl Credential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one named secret.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Reads one named secret.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// A named provider of credential material.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The provider's configured id.
    fn id(&self) -> &str;

    /// Produces current credential material. Providers are expected to
    /// handle refresh internally.
    async fn credentials(&self) -> ComponentResult<Credential>;
}

/// A boxed credential provider.
pub type BoxedCredentialProvider = Arc<dyn CredentialProvider>;

/// Registry of credential providers, keyed by id (case-sensitive).
///
/// The manager populates it during load; components only ever see it
/// behind an `Arc` through their plugin context and treat it as read-only.
pub struct CredentialRegistry {
    providers: RwLock<HashMap<String, BoxedCredentialProvider>>,
}

impl CredentialRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a provider under its id. Returns `false` when the id is
    /// already taken (the existing provider is kept).
    pub fn register(&self, provider: BoxedCredentialProvider) -> bool {
        let id = provider.id().to_string();
        let mut providers = self.providers.write();
        if providers.contains_key(&id) {
            return false;
        }
        providers.insert(id, provider);
        true
    }

    /// Looks up a provider by id.
    pub fn get(&self, id: &str) -> Option<BoxedCredentialProvider> {
        self.providers.read().get(id).cloned()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// Returns `true` when no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Removes every provider. Called when a pipeline generation stops.
    pub fn clear(&self) {
        self.providers.write().clear();
    }
}

impl Default for CredentialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        id: String,
    }

    #[async_trait]
    impl CredentialProvider for StaticProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn credentials(&self) -> ComponentResult<Credential> {
            Ok(Credential::new().with_entry("token", "secret"))
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = CredentialRegistry::new();
        assert!(registry.register(Arc::new(StaticProvider { id: "cred-1".into() })));
        assert!(!registry.register(Arc::new(StaticProvider { id: "cred-1".into() })));

        let provider = registry.get("cred-1").unwrap();
        let material = provider.credentials().await.unwrap();
        assert_eq!(material.get("token"), Some("secret"));

        // Ids are case-sensitive.
        assert!(registry.get("Cred-1").is_none());
    }
}
