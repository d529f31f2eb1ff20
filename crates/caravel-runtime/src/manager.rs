//! The agent lifecycle manager.
//!
//! [`AgentManager`] owns the factory catalogs, the self-metrics source,
//! and the current pipeline generation. `start` executes the load
//! sequence — self-metrics, factory discovery, credential providers,
//! built-in sinks, user sinks, sources, pipe binding, source start,
//! self-update and config-watch timers, plugins — with every per-entry
//! failure logged, counted, and skipped. `stop` tears the generation down
//! with bounded waits and never returns an error.
//!
//! Lifecycle transitions are serialized behind one async mutex: `start`,
//! `stop`, and the reload tick can never overlap, and a reload fully
//! stops the old generation before the new one is constructed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use caravel_core::catalog::CatalogSet;
use caravel_core::component::{BoxedSource, EventSource, GenericPlugin, Pipe, Sink, Source};
use caravel_core::context::{context_keys, parameter_keys, MemoryParameterStore, ParameterStore, PluginContext};
use caravel_core::credentials::CredentialRegistry;
use caravel_core::diagnostics;
use caravel_core::metrics::{counters, CounterType, MetricValue, MetricsPublisher};
use caravel_core::network;
use caravel_sinks::{
    TelemetryConfig, TelemetryConnector, PERFORMANCE_COUNTER_SINK_TYPE, TELEMETRY_CONNECTOR_ID,
    TELEMETRY_SINK_TYPE,
};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::binder::bind_pipe;
use crate::config::{
    extract_section, modified_time, section_or_empty, AgentConfig, ConfigLoader,
};
use crate::registry::{PipelineRegistry, PipelineStats};
use crate::selfmetrics::{SelfMetricsSource, SELF_METRICS_SOURCE_ID};
use crate::selfupdate::{SelfUpdater, UpdateTrigger};

/// Reserved id of the built-in performance-counter sink.
pub const PERFORMANCE_COUNTER_SINK_ID: &str = "_PerformanceCounterSink";
/// Reserved id of the built-in telemetry sink.
pub const TELEMETRY_SINK_ID: &str = "_TelemetrySink";

/// Sources and subscriptions get this long to stop on a regular stop.
const SOURCE_STOP_TIMEOUT: Duration = Duration::from_secs(300);
/// Sinks and plugins always get this long — they flush buffered state.
const SINK_STOP_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    Stopped,
    Started,
}

struct Lifecycle {
    state: ManagerState,
    registry: PipelineRegistry,
    self_updater: Option<SelfUpdater>,
    watch: Option<CancellationToken>,
    config_load_time: Option<SystemTime>,
    loaded_path: Option<PathBuf>,
}

struct ManagerInner {
    catalogs: CatalogSet,
    metrics: Arc<SelfMetricsSource>,
    credentials: Arc<CredentialRegistry>,
    parameters: Arc<dyn ParameterStore>,
    loader: ConfigLoader,
    config_file: parking_lot::Mutex<Option<PathBuf>>,
    config_interval_secs: AtomicU64,
    update_trigger: parking_lot::RwLock<Option<Arc<dyn UpdateTrigger>>>,
    span: tracing::Span,
    lifecycle: AsyncMutex<Lifecycle>,
}

impl ManagerInner {
    /// Builds the plugin context for one component section.
    fn component_context(
        &self,
        section: serde_json::Value,
        id: Option<String>,
    ) -> Arc<PluginContext> {
        let span = match id.as_deref() {
            Some(id) if !id.is_empty() => {
                tracing::info_span!(parent: &self.span, "component", id = %id)
            }
            _ => self.span.clone(),
        };
        let ctx = PluginContext::new(
            section,
            id,
            span,
            self.metrics.clone(),
            self.credentials.clone(),
            self.parameters.clone(),
        );
        ctx.set_data(context_keys::PARSER_CATALOG, Arc::clone(&self.catalogs.parsers));
        Arc::new(ctx)
    }

    fn publish_program(&self, counter_type: CounterType, entries: &[(&str, f64)]) {
        let entries: HashMap<String, MetricValue> = entries
            .iter()
            .map(|(name, value)| (name.to_string(), MetricValue::count(*value, counter_type)))
            .collect();
        self.metrics
            .publish("", counters::CATEGORY_PROGRAM, counter_type, entries);
    }
}

/// Numeric build identifier derived from the crate version.
fn build_number() -> f64 {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .filter_map(|part| part.parse::<u64>().ok());
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    (major * 10_000 + minor * 100 + patch) as f64
}

fn reserved_section(section: &serde_json::Value, id: &str) -> serde_json::Value {
    let mut map = section_or_empty(section);
    map.insert("Id".into(), serde_json::json!(id));
    serde_json::Value::Object(map)
}

// =============================================================================
// Load / Start
// =============================================================================

async fn start_locked(inner: &Arc<ManagerInner>, lifecycle: &mut Lifecycle) -> anyhow::Result<()> {
    if lifecycle.state == ManagerState::Started {
        warn!("Agent is already started");
        return Ok(());
    }

    // Acquiring the configuration document is the only fatal step.
    let path = inner
        .config_file
        .lock()
        .clone()
        .or_else(|| inner.loader.find_config_file());
    let config = match &path {
        Some(path) => inner.loader.load_from_file(path)?,
        None => {
            info!("No configuration file found, starting with defaults");
            AgentConfig::default()
        }
    };

    inner
        .config_interval_secs
        .store(config.config_interval, Ordering::Relaxed);
    diagnostics::set_detailed_errors(config.detailed_errors);

    if let Some(dir) = path.as_ref().and_then(|p| p.parent()) {
        inner
            .parameters
            .set(parameter_keys::CONFIG_DIR, dir.display().to_string());
        inner.parameters.set(
            parameter_keys::LOG_CONFIG_PATH,
            dir.join("logging.yaml").display().to_string(),
        );
        inner.parameters.set(
            parameter_keys::BOOKMARKS_DIR,
            dir.join("bookmarks").display().to_string(),
        );
    }

    // 1. Self-metrics source under its reserved id.
    inner
        .metrics
        .set_interval(Duration::from_secs(config.metrics.interval_seconds));
    if let Err(e) = lifecycle
        .registry
        .insert_source(SELF_METRICS_SOURCE_ID, inner.metrics.clone() as BoxedSource)
    {
        warn!(error = %e, "Could not register self-metrics source");
    }
    if let Err(e) = inner.metrics.start().await {
        warn!(error = %e, "Could not start self-metrics source");
    }

    // 2. Factory discovery.
    let discovery = inner.catalogs.discover();
    for (kind, count) in inner.catalogs.loaded_counts() {
        inner.metrics.publish(
            kind,
            counters::CATEGORY_PROGRAM,
            CounterType::CurrentValue,
            HashMap::from([(
                counters::FACTORIES_LOADED.to_string(),
                MetricValue::count(count as f64, CounterType::CurrentValue),
            )]),
        );
    }
    inner.publish_program(
        CounterType::CurrentValue,
        &[(
            counters::FACTORIES_FAILED_TO_LOAD,
            discovery.providers_failed as f64,
        )],
    );

    // 3. Credential providers.
    let mut credentials_loaded = 0.0;
    let mut credentials_failed = 0.0;
    for entry in &config.credentials {
        let ctx = inner.component_context(entry.section(), Some(entry.id.clone()));
        match inner.catalogs.credentials.create(&entry.credential_type, ctx) {
            None => {
                warn!(id = %entry.id, credential_type = %entry.credential_type, "Unknown credential type");
                credentials_failed += 1.0;
            }
            Some(Err(e)) => {
                warn!(id = %entry.id, error = %diagnostics::render_error(&e), "Failed to construct credential provider");
                credentials_failed += 1.0;
            }
            Some(Ok(provider)) => {
                if inner.credentials.register(provider) {
                    credentials_loaded += 1.0;
                } else {
                    warn!(id = %entry.id, "Duplicate credential provider id");
                    credentials_failed += 1.0;
                }
            }
        }
    }

    // 4. Built-in sinks, subscribed to the self-metrics source.
    let telemetry_config: TelemetryConfig =
        extract_section(&config.telemetrics).unwrap_or_default();
    let mut telemetry_connector: Option<Arc<TelemetryConnector>> = None;

    let perf_ctx = inner.component_context(
        reserved_section(&config.performance_counter, PERFORMANCE_COUNTER_SINK_ID),
        Some(PERFORMANCE_COUNTER_SINK_ID.to_string()),
    );
    if let Some(result) = inner
        .catalogs
        .sinks
        .create(PERFORMANCE_COUNTER_SINK_TYPE, perf_ctx)
    {
        match result {
            Ok(sink) => {
                if let Err(e) = sink.start().await {
                    warn!(error = %e, "Failed to start performance-counter sink");
                } else {
                    if let Some(event_sink) = Arc::clone(&sink).event_sink() {
                        lifecycle
                            .registry
                            .add_subscription(inner.metrics.subscribe(event_sink));
                    }
                    let _ = lifecycle
                        .registry
                        .insert_sink(PERFORMANCE_COUNTER_SINK_ID, sink);
                }
            }
            Err(e) => {
                warn!(error = %diagnostics::render_error(&e), "Failed to construct performance-counter sink")
            }
        }
    }

    if telemetry_config.is_off() {
        debug!("Telemetry is turned off");
    } else if telemetry_config.redirect_to_sink_id.is_some() {
        // Redirected: install the connector source now, couple it to the
        // named sink once user sinks exist.
        let connector = Arc::new(TelemetryConnector::new());
        lifecycle
            .registry
            .add_subscription(inner.metrics.subscribe(connector.clone()));
        let _ = lifecycle
            .registry
            .insert_source(TELEMETRY_CONNECTOR_ID, connector.clone() as BoxedSource);
        telemetry_connector = Some(connector);
    } else {
        let tele_ctx = inner.component_context(
            reserved_section(&config.telemetrics, TELEMETRY_SINK_ID),
            Some(TELEMETRY_SINK_ID.to_string()),
        );
        if let Some(result) = inner.catalogs.sinks.create(TELEMETRY_SINK_TYPE, tele_ctx) {
            match result {
                Ok(sink) => {
                    if let Err(e) = sink.start().await {
                        warn!(error = %e, "Failed to start telemetry sink");
                    } else {
                        if let Some(event_sink) = Arc::clone(&sink).event_sink() {
                            lifecycle
                                .registry
                                .add_subscription(inner.metrics.subscribe(event_sink));
                        }
                        let _ = lifecycle.registry.insert_sink(TELEMETRY_SINK_ID, sink);
                    }
                }
                Err(e) => {
                    warn!(error = %diagnostics::render_error(&e), "Failed to construct telemetry sink")
                }
            }
        }
    }

    // 5. User sinks: constructed and started.
    let mut sinks_started = 0.0;
    let mut sinks_failed = 0.0;
    for entry in &config.sinks {
        if entry.id.trim().is_empty() || entry.sink_type.trim().is_empty() {
            warn!(id = %entry.id, "Sink entry missing Id or SinkType");
            sinks_failed += 1.0;
            continue;
        }
        if lifecycle.registry.sink(&entry.id).is_some() {
            warn!(id = %entry.id, "Duplicate sink id");
            sinks_failed += 1.0;
            continue;
        }
        let ctx = inner.component_context(entry.section(), Some(entry.id.clone()));
        let sink = match inner.catalogs.sinks.create(&entry.sink_type, ctx) {
            None => {
                warn!(id = %entry.id, sink_type = %entry.sink_type, "Unknown sink type");
                sinks_failed += 1.0;
                continue;
            }
            Some(Err(e)) => {
                warn!(id = %entry.id, error = %diagnostics::render_error(&e), "Failed to construct sink");
                sinks_failed += 1.0;
                continue;
            }
            Some(Ok(sink)) => sink,
        };
        if let Err(e) = sink.start().await {
            warn!(id = %entry.id, error = %e, "Failed to start sink");
            sinks_failed += 1.0;
            continue;
        }
        if let Err(e) = lifecycle.registry.insert_sink(&entry.id, sink) {
            warn!(id = %entry.id, error = %e, "Could not register sink");
            sinks_failed += 1.0;
            continue;
        }
        sinks_started += 1.0;
    }

    // 6. User sources: constructed but not started until pipes are bound.
    let mut sources_failed = 0.0;
    for entry in &config.sources {
        if entry.id.trim().is_empty() || entry.source_type.trim().is_empty() {
            warn!(id = %entry.id, "Source entry missing Id or SourceType");
            sources_failed += 1.0;
            continue;
        }
        if lifecycle.registry.source(&entry.id).is_some() {
            warn!(id = %entry.id, "Duplicate source id");
            sources_failed += 1.0;
            continue;
        }
        let ctx = inner.component_context(entry.section(), Some(entry.id.clone()));
        match inner.catalogs.sources.create(&entry.source_type, ctx) {
            None => {
                warn!(id = %entry.id, source_type = %entry.source_type, "Unknown source type");
                sources_failed += 1.0;
            }
            Some(Err(e)) => {
                warn!(id = %entry.id, error = %diagnostics::render_error(&e), "Failed to construct source");
                sources_failed += 1.0;
            }
            Some(Ok(source)) => {
                if let Err(e) = lifecycle.registry.insert_source(&entry.id, source) {
                    warn!(id = %entry.id, error = %e, "Could not register source");
                    sources_failed += 1.0;
                }
            }
        }
    }

    // 7. Pipe binding.
    let mut pipes_connected = 0.0;
    let mut pipes_failed = 0.0;
    for entry in &config.pipes {
        let ctx = inner.component_context(entry.section(), Some(entry.id.clone()));
        match bind_pipe(entry, &mut lifecycle.registry, &inner.catalogs.pipes, ctx).await {
            Ok(_) => pipes_connected += 1.0,
            Err(e) => {
                warn!(pipe = %entry.id, error = %diagnostics::render_error(&e), "Failed to bind pipe");
                pipes_failed += 1.0;
            }
        }
    }

    // Reserved telemetry pipe: connector → redirect sink. A connect
    // failure counts as a failure, it is not swallowed.
    if let (Some(connector), Some(redirect)) = (
        &telemetry_connector,
        telemetry_config.redirect_to_sink_id.as_deref(),
    ) {
        match lifecycle
            .registry
            .sink(redirect)
            .and_then(|sink| sink.event_sink())
        {
            Some(event_sink) => {
                lifecycle
                    .registry
                    .add_subscription(connector.subscribe(event_sink));
                info!(sink = redirect, "Telemetry redirected to sink");
                pipes_connected += 1.0;
            }
            None => {
                warn!(sink = redirect, "Telemetry redirect sink missing or not event-capable");
                pipes_failed += 1.0;
            }
        }
    }

    // 8. Start sources.
    let mut sources_started = 0.0;
    let source_list: Vec<(String, BoxedSource)> = lifecycle
        .registry
        .sources()
        .map(|(id, source)| (id.clone(), Arc::clone(source)))
        .collect();
    for (id, source) in source_list {
        if id == SELF_METRICS_SOURCE_ID || id == TELEMETRY_CONNECTOR_ID {
            continue;
        }
        match source.start().await {
            Ok(()) => sources_started += 1.0,
            Err(e) => {
                error!(id = %id, error = %e, "Failed to start source");
                sources_failed += 1.0;
            }
        }
    }

    // 9. Self-update timer.
    if config.self_update > 0 {
        if let Some(trigger) = inner.update_trigger.read().clone() {
            lifecycle.self_updater = Some(SelfUpdater::arm(
                Duration::from_secs(config.self_update * 60),
                trigger,
            ));
            inner.publish_program(
                CounterType::CurrentValue,
                &[(counters::SELF_UPDATE_FREQUENCY, config.self_update as f64)],
            );
        } else {
            debug!("SelfUpdate configured but no update trigger installed");
        }
    }

    // 10. Config-watch timer.
    if path.is_some() {
        arm_config_watch(inner, lifecycle);
    }

    // 11. Generic plugins.
    let mut plugins_started = 0.0;
    let mut plugins_failed = 0.0;
    for entry in &config.plugins {
        let ctx = inner.component_context(entry.section(), None);
        match inner.catalogs.plugins.create(&entry.plugin_type, ctx) {
            None => {
                warn!(plugin_type = %entry.plugin_type, "Unknown plugin type");
                plugins_failed += 1.0;
            }
            Some(Err(e)) => {
                warn!(plugin_type = %entry.plugin_type, error = %diagnostics::render_error(&e), "Failed to construct plugin");
                plugins_failed += 1.0;
            }
            Some(Ok(plugin)) => match plugin.start().await {
                Ok(()) => {
                    if let Some(provider) = Arc::clone(&plugin).network_status() {
                        network::register(provider);
                    }
                    lifecycle.registry.add_plugin(plugin);
                    plugins_started += 1.0;
                }
                Err(e) => {
                    warn!(plugin_type = %entry.plugin_type, error = %e, "Failed to start plugin");
                    plugins_failed += 1.0;
                }
            },
        }
    }

    inner.publish_program(
        CounterType::CurrentValue,
        &[
            (counters::SOURCES_STARTED, sources_started),
            (counters::SOURCES_FAILED_TO_START, sources_failed),
            (counters::SINKS_STARTED, sinks_started),
            (counters::SINKS_FAILED_TO_START, sinks_failed),
            (counters::PIPES_CONNECTED, pipes_connected),
            (counters::PIPES_FAILED_TO_CONNECT, pipes_failed),
            (counters::PLUGINS_STARTED, plugins_started),
            (counters::PLUGINS_FAILED_TO_START, plugins_failed),
            (counters::CREDENTIALS_LOADED, credentials_loaded),
            (counters::CREDENTIALS_FAILED_TO_LOAD, credentials_failed),
            (counters::BUILD_NUMBER, build_number()),
        ],
    );

    lifecycle.state = ManagerState::Started;
    lifecycle.config_load_time = Some(SystemTime::now());
    lifecycle.loaded_path = path;
    info!(stats = %lifecycle.registry.stats(), "Agent started");
    Ok(())
}

// =============================================================================
// Stop
// =============================================================================

async fn stop_locked(inner: &Arc<ManagerInner>, lifecycle: &mut Lifecycle, service_stopping: bool) {
    if lifecycle.state == ManagerState::Stopped {
        return;
    }
    info!(service_stopping, "Stopping agent");

    // 1. Disarm the timers before anything else so no reload or update
    // fires into a half-stopped pipeline.
    if let Some(watch) = lifecycle.watch.take() {
        watch.cancel();
    }
    if let Some(updater) = lifecycle.self_updater.take() {
        updater.disarm().await;
    }

    // 2. Sources, concurrently with per-source error capture. When the
    // service itself is stopping the grace time belongs to the sink
    // flushes, so source stops are fire-and-forget.
    let source_stops: Vec<_> = lifecycle
        .registry
        .drain_sources()
        .into_iter()
        .map(|(id, source)| async move {
            if let Err(e) = source.stop().await {
                error!(id = %id, error = %e, "Error stopping source");
            }
        })
        .collect();
    if service_stopping {
        for stop in source_stops {
            tokio::spawn(stop);
        }
    } else if timeout(SOURCE_STOP_TIMEOUT, join_all(source_stops))
        .await
        .is_err()
    {
        warn!("Timed out waiting for sources to stop");
    }

    // 3. Dropping the tokens severs every source→sink link.
    drop(lifecycle.registry.drain_subscriptions());

    // 4. Sinks, pipes, and plugins are always awaited — they flush
    // buffered state.
    let mut flush_stops: Vec<BoxFuture<'static, ()>> = Vec::new();
    for (id, sink) in lifecycle.registry.drain_sinks() {
        flush_stops.push(
            async move {
                if let Err(e) = sink.stop().await {
                    error!(id = %id, error = %e, "Error stopping sink");
                }
            }
            .boxed(),
        );
    }
    for (id, pipe) in lifecycle.registry.drain_pipes() {
        flush_stops.push(
            async move {
                if let Err(e) = pipe.stop().await {
                    error!(id = %id, error = %e, "Error stopping pipe");
                }
            }
            .boxed(),
        );
    }
    for plugin in lifecycle.registry.drain_plugins() {
        let name = plugin.type_name().to_string();
        flush_stops.push(
            async move {
                if let Err(e) = plugin.stop().await {
                    error!(plugin = %name, error = %e, "Error stopping plugin");
                }
            }
            .boxed(),
        );
    }
    if timeout(SINK_STOP_TIMEOUT, join_all(flush_stops)).await.is_err() {
        warn!("Timed out waiting for sinks to stop");
    }

    // 5. Process-wide state.
    inner.credentials.clear();
    network::reset();
    diagnostics::set_detailed_errors(false);

    lifecycle.state = ManagerState::Stopped;
    info!("Agent stopped");
}

// =============================================================================
// Hot Reload
// =============================================================================

async fn check_reload_locked(inner: &Arc<ManagerInner>, lifecycle: &mut Lifecycle) {
    let Some(path) = lifecycle.loaded_path.clone() else {
        return;
    };
    let Some(load_time) = lifecycle.config_load_time else {
        return;
    };
    let Some(modified) = modified_time(&path) else {
        return;
    };
    if modified <= load_time {
        return;
    }

    info!(path = %path.display(), "Configuration change detected, reloading");
    stop_locked(inner, lifecycle, false).await;
    match start_locked(inner, lifecycle).await {
        Ok(()) => {
            inner.publish_program(
                CounterType::Increment,
                &[(counters::CONFIG_RELOAD_SUCCESS, 1.0)],
            );
        }
        Err(e) => {
            error!(error = %diagnostics::render_error(&e), "Reload failed, agent remains stopped");
            // Record the attempt so a broken document is not retried
            // until it changes again.
            lifecycle.config_load_time = Some(SystemTime::now());
            inner.publish_program(
                CounterType::Increment,
                &[(counters::CONFIG_RELOAD_FAILURE, 1.0)],
            );
        }
    }
}

fn arm_config_watch(inner: &Arc<ManagerInner>, lifecycle: &mut Lifecycle) {
    let token = CancellationToken::new();
    lifecycle.watch = Some(token.clone());
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        loop {
            let secs = inner.config_interval_secs.load(Ordering::Relaxed).max(1);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
            let mut lifecycle = inner.lifecycle.lock().await;
            // A stop that raced the tick wins.
            if token.is_cancelled() {
                break;
            }
            check_reload_locked(&inner, &mut lifecycle).await;
        }
    });
}

// =============================================================================
// AgentManager
// =============================================================================

/// The agent's lifecycle manager.
///
/// # Example
///
/// ```rust,ignore
/// let manager = AgentManager::new();
/// manager.set_config_file("/etc/caravel/caravel.yaml");
/// manager.start().await?;
/// // ...
/// manager.stop().await;
/// ```
pub struct AgentManager {
    inner: Arc<ManagerInner>,
}

impl AgentManager {
    /// Creates a manager with the default configuration search paths.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                catalogs: CatalogSet::new(),
                metrics: Arc::new(SelfMetricsSource::new()),
                credentials: Arc::new(CredentialRegistry::new()),
                parameters: Arc::new(MemoryParameterStore::new()),
                loader: ConfigLoader::default(),
                config_file: parking_lot::Mutex::new(None),
                config_interval_secs: AtomicU64::new(10),
                update_trigger: parking_lot::RwLock::new(None),
                span: tracing::info_span!("agent"),
                lifecycle: AsyncMutex::new(Lifecycle {
                    state: ManagerState::Stopped,
                    registry: PipelineRegistry::new(),
                    self_updater: None,
                    watch: None,
                    config_load_time: None,
                    loaded_path: None,
                }),
            }),
        }
    }

    /// Pins the configuration document instead of searching for one.
    pub fn set_config_file(&self, path: impl Into<PathBuf>) {
        *self.inner.config_file.lock() = Some(path.into());
    }

    /// Installs the self-update trigger. Without one, `SelfUpdate` in the
    /// configuration is ignored.
    pub fn set_update_trigger(&self, trigger: Arc<dyn UpdateTrigger>) {
        *self.inner.update_trigger.write() = Some(trigger);
    }

    /// Overrides the config-watch tick. Takes effect at the next tick.
    pub fn set_config_interval(&self, interval: Duration) {
        self.inner
            .config_interval_secs
            .store(interval.as_secs().max(1), Ordering::Relaxed);
    }

    /// The current config-watch tick.
    pub fn config_interval(&self) -> Duration {
        Duration::from_secs(self.inner.config_interval_secs.load(Ordering::Relaxed))
    }

    /// The factory catalogs. Hosts register embedded factories here
    /// before `start`; provider discovery adds the rest.
    pub fn catalogs(&self) -> &CatalogSet {
        &self.inner.catalogs
    }

    /// The self-metrics source.
    pub fn metrics(&self) -> &Arc<SelfMetricsSource> {
        &self.inner.metrics
    }

    /// The shared parameter store.
    pub fn parameters(&self) -> &Arc<dyn ParameterStore> {
        &self.inner.parameters
    }

    /// Loads the topology and starts the pipeline.
    ///
    /// Per-entry failures are logged and counted without aborting the
    /// load; only failure to acquire the configuration document itself is
    /// returned as an error.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        start_locked(&self.inner, &mut lifecycle).await
    }

    /// Stops the pipeline. Never fails; double-stop is a no-op.
    pub async fn stop(&self) {
        self.stop_with(false).await;
    }

    /// Stops the pipeline. With `service_stopping` the manager skips
    /// waiting on sources and subscriptions and spends the remaining
    /// grace time on sink flushes.
    pub async fn stop_with(&self, service_stopping: bool) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        stop_locked(&self.inner, &mut lifecycle, service_stopping).await;
    }

    /// Runs one reload check immediately, as the watch timer would.
    pub async fn check_reload(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        check_reload_locked(&self.inner, &mut lifecycle).await;
    }

    /// Whether the pipeline is currently started.
    pub async fn is_started(&self) -> bool {
        self.inner.lifecycle.lock().await.state == ManagerState::Started
    }

    /// Statistics for the current pipeline generation.
    pub async fn stats(&self) -> PipelineStats {
        self.inner.lifecycle.lock().await.registry.stats()
    }
}

impl Default for AgentManager {
    fn default() -> Self {
        Self::new()
    }
}
