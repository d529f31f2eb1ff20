//! Component traits and the capability system.
//!
//! Every pluggable piece of the agent — source, sink, pipe, generic plugin —
//! shares the same small lifecycle surface (`id`, `start`, `stop`) and
//! advertises at most a couple of *capabilities* on top of it:
//!
//! - **event-stream**: [`EventSource`] publishes envelopes to subscribed
//!   [`EventSink`]s through disposable [`Subscription`] tokens;
//! - **data-pull**: a [`DataSink`] registers a [`DataSource`] and queries it
//!   on its own schedule; no subscription is created.
//!
//! The pipeline binder inspects capabilities at connect time and refuses
//! mismatched pairs — there is no deep component hierarchy to navigate.
//!
//! [`Subscription`]: crate::subscription::Subscription

use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::BoxedEnvelope;
use crate::error::ComponentResult;
use crate::metrics::Metric;
use crate::network::NetworkStatusProvider;
use crate::subscription::Subscription;

/// Payload type name accepted by sinks that consume any envelope.
pub const ANY_PAYLOAD: &str = "*";

// =============================================================================
// Capability Traits
// =============================================================================

/// Event-stream production capability.
pub trait EventSource: Send + Sync {
    /// Type name of the payloads this source emits.
    fn payload_type(&self) -> &'static str;

    /// Subscribes a sink; the returned token severs the link on drop.
    fn subscribe(&self, subscriber: Arc<dyn EventSink>) -> Subscription;
}

/// Event-stream consumption capability.
pub trait EventSink: Send + Sync {
    /// Type name of the payloads this sink accepts, or [`ANY_PAYLOAD`].
    fn payload_type(&self) -> &'static str {
        ANY_PAYLOAD
    }

    /// Delivers one envelope. Must not block the caller for long; sinks
    /// with slow downstreams buffer internally.
    fn on_envelope(&self, envelope: BoxedEnvelope);
}

/// Data-pull production capability: consumers query on their own schedule.
pub trait DataSource: Send + Sync {
    /// Returns a snapshot of the source's current metrics.
    fn query(&self) -> Vec<Metric>;
}

/// Data-pull consumption capability.
pub trait DataSink: Send + Sync {
    /// Registers a data source for this sink to poll.
    fn register_data_source(&self, source: Arc<dyn DataSource>);
}

// =============================================================================
// Component Traits
// =============================================================================

/// A producer of timestamped envelopes.
///
/// Sources are constructed by their factory, started after pipes are bound,
/// and stopped exactly once; a second `stop` must be a no-op.
#[async_trait]
pub trait Source: Send + Sync {
    /// The component id this source was configured with.
    fn id(&self) -> &str;

    /// Begins producing events.
    async fn start(&self) -> ComponentResult<()>;

    /// Stops producing events and releases resources.
    async fn stop(&self) -> ComponentResult<()>;

    /// Event-stream capability, if this source publishes envelopes.
    fn event_source(self: Arc<Self>) -> Option<Arc<dyn EventSource>> {
        None
    }

    /// Data-pull capability, if this source can be queried.
    fn data_source(self: Arc<Self>) -> Option<Arc<dyn DataSource>> {
        None
    }
}

/// A consumer that forwards envelopes outward.
#[async_trait]
pub trait Sink: Send + Sync {
    /// The component id this sink was configured with.
    fn id(&self) -> &str;

    /// Prepares the sink for traffic (connections, buffers, timers).
    async fn start(&self) -> ComponentResult<()>;

    /// Flushes buffered state and releases resources. Double-stop is a
    /// no-op.
    async fn stop(&self) -> ComponentResult<()>;

    /// Event-stream capability, if this sink accepts subscriptions.
    fn event_sink(self: Arc<Self>) -> Option<Arc<dyn EventSink>> {
        None
    }

    /// Data-pull capability, if this sink polls registered sources.
    fn data_sink(self: Arc<Self>) -> Option<Arc<dyn DataSink>> {
        None
    }
}

/// An in-process transformer between a source and a sink.
///
/// A pipe is both an event sink (its upstream side) and an event source
/// (its downstream side); payload transformation happens in between. The
/// binder hands the upstream and downstream payload types to the pipe
/// factory through the plugin-context side channel.
#[async_trait]
pub trait Pipe: Send + Sync {
    /// The component id this pipe was configured with.
    fn id(&self) -> &str;

    /// Starts the pipe. Called before its subscriptions are created.
    async fn start(&self) -> ComponentResult<()>;

    /// Stops the pipe.
    async fn stop(&self) -> ComponentResult<()>;

    /// The upstream side, subscribed to the source.
    fn event_sink(self: Arc<Self>) -> Arc<dyn EventSink>;

    /// The downstream side, which the sink subscribes to.
    fn event_source(self: Arc<Self>) -> Arc<dyn EventSource>;
}

/// A generic plugin with no dataflow role of its own.
#[async_trait]
pub trait GenericPlugin: Send + Sync {
    /// The plugin's configured type name (plugins have no id).
    fn type_name(&self) -> &str;

    /// Starts the plugin.
    async fn start(&self) -> ComponentResult<()>;

    /// Stops the plugin.
    async fn stop(&self) -> ComponentResult<()>;

    /// Network-status capability, if this plugin reports connectivity.
    fn network_status(self: Arc<Self>) -> Option<Arc<dyn NetworkStatusProvider>> {
        None
    }
}

/// Boxed component aliases used throughout the registries.
pub type BoxedSource = Arc<dyn Source>;
/// See [`BoxedSource`].
pub type BoxedSink = Arc<dyn Sink>;
/// See [`BoxedSource`].
pub type BoxedPipe = Arc<dyn Pipe>;
/// See [`BoxedSource`].
pub type BoxedPlugin = Arc<dyn GenericPlugin>;
