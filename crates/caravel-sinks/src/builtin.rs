//! Factory-provider registration for the built-in sinks.
//!
//! This crate contributes the telemetry and performance-counter sink
//! factories through the core's provider-discovery slice; the runtime
//! resolves them by their reserved type names during topology load.

use std::sync::Arc;

use caravel_core::catalog::{CatalogSet, FactoryProvider, FACTORY_PROVIDERS};
use caravel_core::component::BoxedSink;
use linkme::distributed_slice;

use crate::perfcounter::{PerformanceCounterSink, PERFORMANCE_COUNTER_SINK_TYPE};
use crate::telemetry::{TelemetryConfig, TelemetrySink, TELEMETRY_SINK_TYPE};

#[distributed_slice(FACTORY_PROVIDERS)]
static BUILTIN_SINKS: FactoryProvider = FactoryProvider {
    name: "caravel-builtin-sinks",
    register: register_builtin_sinks,
};

fn register_builtin_sinks(catalogs: &CatalogSet) -> anyhow::Result<()> {
    catalogs.sinks.register(PERFORMANCE_COUNTER_SINK_TYPE, |type_name, ctx| {
        let id = ctx.id().unwrap_or(type_name).to_string();
        Ok(Arc::new(PerformanceCounterSink::new(id)) as BoxedSink)
    });

    catalogs.sinks.register(TELEMETRY_SINK_TYPE, |type_name, ctx| {
        let config: TelemetryConfig = ctx.extract()?;
        let id = ctx.id().unwrap_or(type_name).to_string();
        Ok(Arc::new(TelemetrySink::with_default_transport(id, &config)) as BoxedSink)
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_core::component::Sink;
    use caravel_core::context::PluginContext;

    #[test]
    fn test_builtin_factories_discoverable() {
        let catalogs = CatalogSet::new();
        let outcome = catalogs.discover();
        assert!(outcome.providers_loaded >= 1);
        assert_eq!(outcome.providers_failed, 0);

        // Reserved names resolve case-insensitively.
        let ctx = Arc::new(PluginContext::empty());
        let sink = catalogs
            .sinks
            .create("performancecounter", ctx.clone())
            .unwrap()
            .unwrap();
        assert_eq!(sink.id(), "performancecounter");

        assert!(catalogs.sinks.get("TELEMETRY").is_some());
    }
}
