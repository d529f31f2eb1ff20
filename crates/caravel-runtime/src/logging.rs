//! Logging setup for the Caravel agent.
//!
//! A thin builder over `tracing-subscriber`: environment-based filtering
//! via `RUST_LOG`, optional directives, and span events for watching
//! component lifecycles. The manager initializes logging once behind an
//! atomic flag; hosts that want full control call
//! [`LoggingBuilder::try_init`] themselves before constructing the
//! manager.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Global flag to track if logging has been initialized.
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Returns whether logging has been initialized through this module.
pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::SeqCst)
}

/// Initializes logging with the given default level unless something
/// already did.
pub fn init_once(level: &str) {
    if LOGGING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        let _ = LoggingBuilder::new().directive(level).try_init();
    }
}

/// Span event configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanEvents {
    /// Log when a span is created.
    pub new: bool,
    /// Log when a span is closed.
    pub close: bool,
}

impl SpanEvents {
    /// No span events.
    pub const NONE: Self = Self {
        new: false,
        close: false,
    };

    /// Component lifecycle events (new + close).
    pub const LIFECYCLE: Self = Self {
        new: true,
        close: true,
    };

    fn to_fmt_span(self) -> fmt::format::FmtSpan {
        let mut span = fmt::format::FmtSpan::NONE;
        if self.new {
            span |= fmt::format::FmtSpan::NEW;
        }
        if self.close {
            span |= fmt::format::FmtSpan::CLOSE;
        }
        span
    }
}

/// A builder for configuring logging.
///
/// # Example
///
/// ```rust,ignore
/// LoggingBuilder::new()
///     .directive("caravel_runtime=debug")
///     .with_span_events(SpanEvents::LIFECYCLE)
///     .init();
/// ```
#[derive(Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    span_events: SpanEvents,
    with_target: bool,
    with_thread_ids: bool,
    #[cfg(feature = "json-log")]
    json: bool,
}

impl LoggingBuilder {
    /// Create a new logging builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter directive, e.g. `"caravel_sinks=trace"`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Configure span events for component lifecycle visibility.
    pub fn with_span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    /// Include the target (module path) in log output.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Include thread IDs in log output.
    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Enable JSON output format.
    #[cfg(feature = "json-log")]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    /// Initialize the logging system.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber has already been set.
    pub fn init(self) {
        LOGGING_INITIALIZED.store(true, Ordering::SeqCst);
        let filter = self.build_filter();

        #[cfg(feature = "json-log")]
        if self.json {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_span_events(self.span_events.to_fmt_span()),
                )
                .with(filter)
                .init();
            return;
        }

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_span_events(self.span_events.to_fmt_span())
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids),
            )
            .with(filter)
            .init();
    }

    /// Try to initialize the logging system, returning an error instead of
    /// panicking when a subscriber is already set.
    pub fn try_init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        LOGGING_INITIALIZED.store(true, Ordering::SeqCst);
        let filter = self.build_filter();

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_span_events(self.span_events.to_fmt_span())
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids),
            )
            .with(filter)
            .try_init()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}
