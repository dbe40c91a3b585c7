//! In-process publish/subscribe bus
//!
//! Subsystems communicate through topic-keyed broadcast channels: the
//! checkin service announces device events, the command service announces
//! queued commands, and the command queue consumes them. The bus is
//! allocated once during bootstrap and shared by reference; delivery is
//! best-effort (events published with no live subscriber are dropped).

use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Topic carrying device checkin events
pub const TOPIC_CHECKIN: &str = "mdm.Checkin";

/// Topic carrying push-token updates
pub const TOPIC_TOKEN_UPDATE: &str = "mdm.TokenUpdate";

/// Topic carrying newly queued commands
pub const TOPIC_COMMAND_QUEUED: &str = "mdm.CommandQueued";

const CHANNEL_CAPACITY: usize = 64;

/// An event on the bus
#[derive(Debug, Clone)]
pub struct Event {
    /// The topic the event was published on
    pub topic: String,
    /// Structured payload
    pub payload: serde_json::Value,
}

/// Topic-keyed broadcast bus
#[derive(Debug, Default)]
pub struct PubSub {
    topics: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event; dropped when the topic has no subscribers
    pub fn publish(&self, topic: &str, payload: serde_json::Value) {
        let topics = self.topics.read().unwrap();
        if let Some(sender) = topics.get(topic) {
            let event = Event {
                topic: topic.to_string(),
                payload,
            };
            // A send error only means every subscriber is gone.
            let _ = sender.send(event);
        } else {
            debug!(topic, "event published with no subscribers");
        }
    }

    /// Subscribe to a topic, creating its channel on first use
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        let mut topics = self.topics.write().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
