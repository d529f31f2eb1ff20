//! Unified error types for the core dataflow model.

use thiserror::Error;

/// Errors raised by component lifecycle and dataflow operations.
#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    /// A component failed to start.
    #[error("component '{id}' failed to start: {reason}")]
    StartFailed {
        /// The offending component id.
        id: String,
        /// Reason for failure.
        reason: String,
    },

    /// A component failed to stop cleanly.
    #[error("component '{id}' failed to stop: {reason}")]
    StopFailed {
        /// The offending component id.
        id: String,
        /// Reason for failure.
        reason: String,
    },

    /// A configuration section was rejected by its component.
    #[error("invalid configuration for '{id}': {reason}")]
    InvalidConfig {
        /// The offending component id.
        id: String,
        /// Reason for rejection.
        reason: String,
    },

    /// A credential provider could not produce material.
    #[error("credential error: {0}")]
    Credential(String),

    /// A record parser rejected its input.
    #[error("parse error: {0}")]
    Parse(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl ComponentError {
    /// Shorthand for a start failure.
    pub fn start_failed(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::StartFailed {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a stop failure.
    pub fn stop_failed(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for component operations.
pub type ComponentResult<T> = Result<T, ComponentError>;
