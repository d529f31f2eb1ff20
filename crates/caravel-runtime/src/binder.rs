//! Pipeline binding: wiring pipe entries into live subscriptions.
//!
//! For each `Pipes` entry the binder resolves the referenced components by
//! id and picks the coupling the two sides support:
//!
//! - both event-stream, no pipe `Type`: the sink subscribes directly to
//!   the source;
//! - both event-stream, with a pipe `Type`: the pipe factory is resolved,
//!   the upstream/downstream payload types are stashed in the context
//!   side channel, the pipe is constructed and started, and two
//!   subscriptions are created (source→pipe, pipe→sink);
//! - both data-pull: the sink registers the source through its data-sink
//!   capability; no subscription exists;
//! - anything else is a capability mismatch.
//!
//! An entry without a `SourceRef` is declaration-only: the sink side is
//! still validated but no coupling is installed. A missing or unknown
//! `SinkRef` fails the entry. Failures never abort the rest of the pipe
//! section; the manager counts and moves on.

use std::sync::Arc;

use anyhow::bail;
use caravel_core::catalog::FactoryCatalog;
use caravel_core::component::{BoxedPipe, DataSink, EventSink, EventSource, Pipe, Sink, Source};
use caravel_core::context::{context_keys, PluginContext};
use tracing::debug;

use crate::config::PipeEntry;
use crate::registry::PipelineRegistry;

/// How a pipe entry was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDisposition {
    /// A live coupling was installed.
    Connected,
    /// The entry declared no `SourceRef`; nothing was installed.
    DeclarationOnly,
}

/// Binds one pipe entry against the current registry.
pub async fn bind_pipe(
    entry: &PipeEntry,
    registry: &mut PipelineRegistry,
    pipe_catalog: &FactoryCatalog<BoxedPipe>,
    ctx: Arc<PluginContext>,
) -> anyhow::Result<BindDisposition> {
    let sink_ref = match entry.sink_ref.as_deref() {
        Some(sink_ref) if !sink_ref.trim().is_empty() => sink_ref,
        _ => bail!("pipe '{}' declares no SinkRef", entry.id),
    };
    let Some(sink) = registry.sink(sink_ref) else {
        bail!("pipe '{}' references unknown sink '{sink_ref}'", entry.id);
    };

    let source_ref = match entry.source_ref.as_deref() {
        Some(source_ref) if !source_ref.trim().is_empty() => source_ref,
        _ => {
            debug!(pipe = %entry.id, "Declaration-only pipe, no subscription created");
            return Ok(BindDisposition::DeclarationOnly);
        }
    };
    let Some(source) = registry.source(source_ref) else {
        bail!(
            "pipe '{}' references unknown source '{source_ref}'",
            entry.id
        );
    };

    let event_source = Arc::clone(&source).event_source();
    let event_sink = Arc::clone(&sink).event_sink();
    if let (Some(event_source), Some(event_sink)) = (event_source, event_sink) {
        match entry.pipe_type.as_deref().filter(|t| !t.trim().is_empty()) {
            None => {
                registry.add_subscription(event_source.subscribe(event_sink));
                debug!(pipe = %entry.id, source = source_ref, sink = sink_ref, "Direct subscription installed");
            }
            Some(pipe_type) => {
                let Some(factory) = pipe_catalog.get(pipe_type) else {
                    bail!("pipe '{}' has unknown type '{pipe_type}'", entry.id);
                };

                ctx.set_data(
                    context_keys::SOURCE_PAYLOAD_TYPE,
                    Arc::new(event_source.payload_type()),
                );
                ctx.set_data(
                    context_keys::SINK_PAYLOAD_TYPE,
                    Arc::new(event_sink.payload_type()),
                );

                let pipe = factory(pipe_type, ctx)?;
                pipe.start().await?;

                let upstream = event_source.subscribe(Arc::clone(&pipe).event_sink());
                let downstream = Arc::clone(&pipe).event_source().subscribe(event_sink);
                registry.insert_pipe(&entry.id, pipe)?;
                registry.add_subscription(upstream);
                registry.add_subscription(downstream);
                debug!(pipe = %entry.id, pipe_type, source = source_ref, sink = sink_ref, "Transforming pipe installed");
            }
        }
        return Ok(BindDisposition::Connected);
    }

    let data_source = Arc::clone(&source).data_source();
    let data_sink = Arc::clone(&sink).data_sink();
    if let (Some(data_source), Some(data_sink)) = (data_source, data_sink) {
        data_sink.register_data_source(data_source);
        debug!(pipe = %entry.id, source = source_ref, sink = sink_ref, "Data-pull coupling installed");
        return Ok(BindDisposition::Connected);
    }

    bail!(
        "pipe '{}' cannot couple '{source_ref}' to '{sink_ref}': incompatible capabilities",
        entry.id
    );
}
