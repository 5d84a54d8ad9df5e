//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the publisher.  A slow subscriber lags and loses the oldest events; it can
//! never stall a pipeline worker.
//!
//! # Topics
//!
//! | Topic | Payload |
//! |---|---|
//! | [`Topic::StateChanges`] | [`EventPayload::StateChanged`] |
//! | [`Topic::Guidance`] | [`EventPayload::GuidanceIssued`] |
//! | [`Topic::Alerts`] | [`EventPayload::AlertIssued`] |
//! | [`Topic::Telemetry`] | [`EventPayload::Telemetry`] |
//! | [`Topic::Faults`] | [`EventPayload::WorkerFault`] |

use navsight_types::{Event, EventPayload, NavError};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Navigation state transitions.
    StateChanges,
    /// Guidance recommendations.
    Guidance,
    /// Alerts handed to the output sink.
    Alerts,
    /// Periodic pipeline reports.
    Telemetry,
    /// Worker errors and stalls.
    Faults,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::StateChanges,
        Topic::Guidance,
        Topic::Alerts,
        Topic::Telemetry,
        Topic::Faults,
    ];

    /// The lane a payload belongs on.
    pub fn of(payload: &EventPayload) -> Topic {
        match payload {
            EventPayload::StateChanged(_) => Topic::StateChanges,
            EventPayload::GuidanceIssued(_) => Topic::Guidance,
            EventPayload::AlertIssued(_) => Topic::Alerts,
            EventPayload::Telemetry(_) => Topic::Telemetry,
            EventPayload::WorkerFault { .. } => Topic::Faults,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    state_changes: broadcast::Sender<Event>,
    guidance: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
    telemetry: broadcast::Sender<Event>,
    faults: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state_changes: broadcast::channel(capacity).0,
            guidance: broadcast::channel(capacity).0,
            alerts: broadcast::channel(capacity).0,
            telemetry: broadcast::channel(capacity).0,
            faults: broadcast::channel(capacity).0,
        }
    }

    /// Publish `event` to `topic`.
    ///
    /// Returns the number of receivers handed the event, or
    /// [`NavError::Channel`] when nobody is listening.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, NavError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| NavError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    /// Fire-and-forget publish, routed by payload.  Having no subscribers is
    /// normal and yields `0`.
    pub fn emit(&self, event: Event) -> usize {
        let topic = Topic::of(&event.payload);
        match self.publish_to(topic, event) {
            Ok(n) => n,
            Err(_) => {
                trace!(?topic, "event dropped; no subscribers");
                0
            }
        }
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::StateChanges => &self.state_changes,
            Topic::Guidance => &self.guidance,
            Topic::Alerts => &self.alerts,
            Topic::Telemetry => &self.telemetry,
            Topic::Faults => &self.faults,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`][Self::recv] but skips over lag, returning `None` only
    /// once the bus is gone.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; lagged events are skipped.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
