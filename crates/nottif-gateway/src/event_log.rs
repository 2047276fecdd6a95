//! Bounded, newest-first log of notification attempts.

use tokio::sync::RwLock;
use tracing::warn;

use nottif_types::{Event, EventSource};

use crate::broadcast::{Broadcaster, Subscription};

/// Number of events kept in memory.
pub const EVENT_LOG_CAPACITY: usize = 10;

pub struct EventLog {
    events: RwLock<Vec<Event>>,
    broadcaster: Broadcaster,
    capacity: usize,
}

impl EventLog {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self::with_capacity(broadcaster, EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(broadcaster: Broadcaster, capacity: usize) -> Self {
        Self {
            events: RwLock::new(Vec::with_capacity(capacity + 1)),
            broadcaster,
            capacity,
        }
    }

    /// Prepend an event, trim to capacity and publish the full log.
    ///
    /// The write lock is held until the snapshot is handed to the
    /// broadcaster, so subscribers see snapshots in record order.
    pub async fn record(&self, source: EventSource, message: &str, success: bool) -> Event {
        let mut events = self.events.write().await;
        let event = Event::new(source, message, success);
        events.insert(0, event.clone());
        events.truncate(self.capacity);
        match serde_json::to_string(&*events) {
            Ok(json) => self.broadcaster.publish(json),
            Err(e) => warn!("Failed to serialize event log: {e}"),
        }
        event
    }

    /// Copy of the current log, newest first.
    pub async fn snapshot(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// Current log plus a subscription that yields every snapshot published
    /// after it, with nothing missed or repeated in between.
    pub async fn subscribe(&self) -> (Vec<Event>, Subscription) {
        let events = self.events.read().await;
        let subscription = self.broadcaster.subscribe();
        (events.clone(), subscription)
    }
}
