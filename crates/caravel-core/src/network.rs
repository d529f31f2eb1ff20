//! Process-wide network-status provider registry.
//!
//! Plugins that can observe connectivity register themselves here during
//! `Start`; sinks consult [`is_available`] before attempting uploads. The
//! registry is process-global by design and must be [`reset`] when the
//! pipeline stops so a reloaded generation starts from a clean slate.

use std::sync::Arc;

use parking_lot::Mutex;

/// Reports the host's network condition.
pub trait NetworkStatusProvider: Send + Sync {
    /// Whether the network is usable at all.
    fn is_available(&self) -> bool;

    /// Whether an upload of the given priority should proceed now.
    /// Priority 0 is the most important.
    fn can_upload(&self, _priority: u32) -> bool {
        self.is_available()
    }

    /// Whether a download of the given priority should proceed now.
    fn can_download(&self, _priority: u32) -> bool {
        self.is_available()
    }
}

static PROVIDERS: Mutex<Vec<Arc<dyn NetworkStatusProvider>>> = Mutex::new(Vec::new());

/// Registers a provider. Called by the manager when a plugin declares the
/// network-status capability.
pub fn register(provider: Arc<dyn NetworkStatusProvider>) {
    PROVIDERS.lock().push(provider);
}

/// Clears every registered provider. Called when the pipeline stops.
pub fn reset() {
    PROVIDERS.lock().clear();
}

/// Number of registered providers.
pub fn provider_count() -> usize {
    PROVIDERS.lock().len()
}

/// The network is considered available when every registered provider
/// agrees; with no providers registered it is assumed available.
pub fn is_available() -> bool {
    PROVIDERS.lock().iter().all(|p| p.is_available())
}

/// Whether an upload of the given priority should proceed now.
pub fn can_upload(priority: u32) -> bool {
    PROVIDERS.lock().iter().all(|p| p.can_upload(priority))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    impl NetworkStatusProvider for Fixed {
        fn is_available(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_registry_lifecycle() {
        reset();
        assert!(is_available());

        register(Arc::new(Fixed(true)));
        register(Arc::new(Fixed(false)));
        assert_eq!(provider_count(), 2);
        assert!(!is_available());
        assert!(!can_upload(0));

        reset();
        assert_eq!(provider_count(), 0);
        assert!(is_available());
    }
}
