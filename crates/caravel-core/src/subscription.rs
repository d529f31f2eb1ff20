//! Observer subscriptions between event sources and event sinks.
//!
//! Wiring a source to a sink yields a [`Subscription`] token; dropping the
//! token severs the link. Sources embed a [`SubscriberHub`] and publish
//! through it — they never hold back-references to their subscribers'
//! owners, so tearing down a pipeline is just dropping the token list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::component::EventSink;
use crate::envelope::BoxedEnvelope;

type SubscriberMap = Mutex<HashMap<u64, Arc<dyn EventSink>>>;

/// Subscriber registry embedded in event-stream sources.
///
/// `publish` snapshots the subscriber list before delivering, so a
/// subscriber disposing its token from inside `on_envelope` cannot
/// deadlock the hub.
pub struct SubscriberHub {
    subscribers: Arc<SubscriberMap>,
    next_token: AtomicU64,
}

impl SubscriberHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
        }
    }

    /// Adds a subscriber and returns its disposal token.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSink>) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(token, subscriber);
        Subscription {
            subscribers: Arc::downgrade(&self.subscribers),
            token,
        }
    }

    /// Delivers an envelope to every current subscriber.
    pub fn publish(&self, envelope: BoxedEnvelope) {
        let snapshot: Vec<Arc<dyn EventSink>> =
            self.subscribers.lock().values().cloned().collect();
        for subscriber in snapshot {
            subscriber.on_envelope(envelope.clone());
        }
    }

    /// Returns the current subscriber count.
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Returns `true` when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}

/// An owned subscription token.
///
/// Dropping the token removes the subscriber from its hub. Disposal after
/// the hub itself is gone is a no-op.
pub struct Subscription {
    subscribers: Weak<SubscriberMap>,
    token: u64,
}

impl Subscription {
    /// Explicitly severs the link. Equivalent to dropping the token.
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().remove(&self.token);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("token", &self.token).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use parking_lot::Mutex as PlMutex;

    struct Recorder {
        seen: PlMutex<Vec<String>>,
    }

    impl EventSink for Recorder {
        fn on_envelope(&self, envelope: BoxedEnvelope) {
            if let Some(text) = envelope.downcast_ref::<String>() {
                self.seen.lock().push(text.clone());
            }
        }
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let hub = SubscriberHub::new();
        let recorder = Arc::new(Recorder { seen: PlMutex::new(Vec::new()) });
        let subscription = hub.subscribe(recorder.clone());

        hub.publish(Envelope::now("one".to_string()).boxed());
        hub.publish(Envelope::now("two".to_string()).boxed());

        assert_eq!(*recorder.seen.lock(), vec!["one", "two"]);
        drop(subscription);
    }

    #[test]
    fn test_dispose_severs_link() {
        let hub = SubscriberHub::new();
        let recorder = Arc::new(Recorder { seen: PlMutex::new(Vec::new()) });
        let subscription = hub.subscribe(recorder.clone());
        assert_eq!(hub.len(), 1);

        subscription.dispose();
        assert_eq!(hub.len(), 0);

        hub.publish(Envelope::now("dropped".to_string()).boxed());
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_dispose_after_hub_dropped_is_noop() {
        let hub = SubscriberHub::new();
        let recorder = Arc::new(Recorder { seen: PlMutex::new(Vec::new()) });
        let subscription = hub.subscribe(recorder);
        drop(hub);
        subscription.dispose();
    }
}
