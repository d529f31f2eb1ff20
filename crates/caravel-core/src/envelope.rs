//! Event envelopes.
//!
//! Every record flowing through the agent travels inside an envelope that
//! carries the payload together with its UTC timestamp and the opaque
//! bookmark/position metadata the producing source attached to it.
//!
//! Sources produce typed [`Envelope<T>`] values; the subscription fabric
//! moves the type-erased [`BoxedEnvelope`] form, which consumers downcast
//! back to the payload type they expect.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A typed event envelope.
///
/// Envelopes are immutable: transforming a payload produces a new envelope
/// (see [`BoxedEnvelope::with_payload`]), never a mutation of this one.
/// Ordering across envelopes from a single source follows the source's
/// timestamps; across sources there is no ordering guarantee.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    payload: T,
    timestamp: DateTime<Utc>,
    bookmark: Option<String>,
    position: Option<u64>,
}

impl<T> Envelope<T> {
    /// Creates an envelope with the given payload and timestamp.
    pub fn new(payload: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload,
            timestamp,
            bookmark: None,
            position: None,
        }
    }

    /// Creates an envelope stamped with the current time.
    pub fn now(payload: T) -> Self {
        Self::new(payload, Utc::now())
    }

    /// Attaches an opaque bookmark token.
    pub fn with_bookmark(mut self, bookmark: impl Into<String>) -> Self {
        self.bookmark = Some(bookmark.into());
        self
    }

    /// Attaches an opaque source position.
    pub fn with_position(mut self, position: u64) -> Self {
        self.position = Some(position);
        self
    }

    /// Returns the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the envelope, returning the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns the envelope timestamp (UTC).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the bookmark token, if any.
    pub fn bookmark(&self) -> Option<&str> {
        self.bookmark.as_deref()
    }

    /// Returns the source position, if any.
    pub fn position(&self) -> Option<u64> {
        self.position
    }
}

impl<T: Send + Sync + 'static> Envelope<T> {
    /// Erases the payload type for transport across a subscription.
    pub fn boxed(self) -> BoxedEnvelope {
        BoxedEnvelope {
            payload: Arc::new(self.payload),
            payload_type: std::any::type_name::<T>(),
            timestamp: self.timestamp,
            bookmark: self.bookmark,
            position: self.position,
        }
    }
}

/// A type-erased envelope.
///
/// This is the wire form crossing source→sink subscriptions. The payload
/// sits behind an `Arc` so fan-out to multiple subscribers is a cheap
/// clone; [`downcast_ref`](Self::downcast_ref) recovers the typed view.
#[derive(Clone)]
pub struct BoxedEnvelope {
    payload: Arc<dyn Any + Send + Sync>,
    payload_type: &'static str,
    timestamp: DateTime<Utc>,
    bookmark: Option<String>,
    position: Option<u64>,
}

impl BoxedEnvelope {
    /// Creates a boxed envelope directly from a payload and timestamp.
    pub fn new<T: Send + Sync + 'static>(payload: T, timestamp: DateTime<Utc>) -> Self {
        Envelope::new(payload, timestamp).boxed()
    }

    /// Attempts to downcast the payload to a concrete type.
    pub fn downcast_ref<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    /// Returns the payload's type name, as recorded by the producer.
    pub fn payload_type(&self) -> &'static str {
        self.payload_type
    }

    /// Returns the envelope timestamp (UTC).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the bookmark token, if any.
    pub fn bookmark(&self) -> Option<&str> {
        self.bookmark.as_deref()
    }

    /// Returns the source position, if any.
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    /// Produces a new envelope with a transformed payload, preserving
    /// timestamp, bookmark, and position.
    ///
    /// This is the primitive pipes use: the metadata the source attached
    /// must survive the transformation so downstream bookmark handling
    /// keeps working.
    pub fn with_payload<T: Send + Sync + 'static>(&self, payload: T) -> Self {
        Self {
            payload: Arc::new(payload),
            payload_type: std::any::type_name::<T>(),
            timestamp: self.timestamp,
            bookmark: self.bookmark.clone(),
            position: self.position,
        }
    }
}

impl std::fmt::Debug for BoxedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedEnvelope")
            .field("payload_type", &self.payload_type)
            .field("timestamp", &self.timestamp)
            .field("bookmark", &self.bookmark)
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_roundtrip() {
        let envelope = Envelope::now("hello".to_string())
            .with_bookmark("bm-1")
            .with_position(42);
        let timestamp = envelope.timestamp();
        let boxed = envelope.boxed();

        assert_eq!(boxed.downcast_ref::<String>().unwrap(), "hello");
        assert_eq!(boxed.timestamp(), timestamp);
        assert_eq!(boxed.bookmark(), Some("bm-1"));
        assert_eq!(boxed.position(), Some(42));
        assert!(boxed.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn test_with_payload_preserves_metadata() {
        let boxed = Envelope::now(7u64).with_bookmark("bm").with_position(3).boxed();
        let mapped = boxed.with_payload("seven".to_string());

        assert_eq!(mapped.downcast_ref::<String>().unwrap(), "seven");
        assert_eq!(mapped.timestamp(), boxed.timestamp());
        assert_eq!(mapped.bookmark(), Some("bm"));
        assert_eq!(mapped.position(), Some(3));
        assert_ne!(mapped.payload_type(), boxed.payload_type());
    }
}
