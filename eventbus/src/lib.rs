//! EventBus - Topic-Based Broadcast
//!
//! A small publish/subscribe bus: subscribers attach a channel to a topic,
//! publishers fire values at a topic and move on. Delivery happens on a
//! spawned task per publication, so `publish` never blocks the caller; a
//! subscriber that stops draining its channel only stalls its own
//! deliveries.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Default capacity of a subscriber channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// An opaque topic label.
///
/// Topics are plain strings; nothing requires them to be unique across
/// publishers. Two publishers sharing a topic simply produce two
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Cow<'static, str>);

impl Topic {
    /// Create a topic from a static string, usable in `const` contexts.
    pub const fn from_static(s: &'static str) -> Self {
        Topic(Cow::Borrowed(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Topic {
    fn from(s: &'static str) -> Self {
        Topic(Cow::Borrowed(s))
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Topic(Cow::Owned(s))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `(topic, data)` pair as seen by subscribers.
#[derive(Debug, Clone)]
pub struct Event<T> {
    topic: Topic,
    data: T,
}

impl<T> Event<T> {
    pub fn new(topic: Topic, data: T) -> Self {
        Self { topic, data }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

/// Receiving half of a subscription.
pub type EventReceiver<T> = mpsc::Receiver<Event<T>>;

/// Topic → multi-subscriber broadcaster.
///
/// Subscriptions are append-only. Publishing clones the value once per
/// subscriber and writes the channels sequentially on a dedicated task,
/// so ordering holds within a single publication but not across
/// concurrent ones.
pub struct EventBus<T> {
    subscribers: RwLock<HashMap<Topic, Vec<mpsc::Sender<Event<T>>>>>,
    capacity: usize,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus whose subscriber channels buffer `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Attach a fresh channel to `topic` and return its receiving half.
    pub fn subscribe(&self, topic: impl Into<Topic>) -> EventReceiver<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subscribers = self.subscribers.write();
        subscribers.entry(topic.into()).or_default().push(tx);
        rx
    }

    pub fn has_subscribers(&self, topic: &Topic) -> bool {
        let subscribers = self.subscribers.read();
        subscribers.get(topic).is_some_and(|subs| !subs.is_empty())
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Publish `data` under `topic`.
    ///
    /// Returns immediately; delivery runs on a spawned task that writes
    /// each subscriber channel in subscription order. Channels whose
    /// receiver has been dropped are skipped.
    pub fn publish(&self, topic: impl Into<Topic>, data: T) {
        let topic = topic.into();
        let senders = {
            let subscribers = self.subscribers.read();
            match subscribers.get(&topic) {
                Some(senders) if !senders.is_empty() => senders.clone(),
                _ => return,
            }
        };
        tokio::spawn(async move {
            for sender in senders {
                let event = Event::new(topic.clone(), data.clone());
                let _ = sender.send(event).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("metrics");

        bus.publish("metrics", 42u32);

        let event = rx.recv().await.expect("event");
        assert_eq!(event.topic().as_str(), "metrics");
        assert_eq!(*event.data(), 42);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe("cfg");
        let mut rx2 = bus.subscribe("cfg");

        bus.publish("cfg", "updated".to_string());

        assert_eq!(rx1.recv().await.unwrap().into_data(), "updated");
        assert_eq!(rx2.recv().await.unwrap().into_data(), "updated");
    }

    #[tokio::test]
    async fn test_unrelated_topic_receives_nothing() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("a");

        bus.publish("b", 1i32);

        let outcome = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(outcome.is_err(), "subscriber of `a` must not see `b`");
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_block_others() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe("cfg");
        let mut rx2 = bus.subscribe("cfg");
        drop(rx1);

        bus.publish("cfg", 7i32);

        assert_eq!(rx2.recv().await.unwrap().into_data(), 7);
    }

    #[tokio::test]
    async fn test_has_subscribers() {
        let bus = EventBus::<i32>::new();
        assert!(!bus.has_subscribers(&Topic::from_static("cfg")));
        let _rx = bus.subscribe("cfg");
        assert!(bus.has_subscribers(&Topic::from_static("cfg")));
    }
}
