//! Fan-out hub for serialized event log snapshots.
//!
//! A single coordinator task owns the subscriber set and is driven through
//! an unbounded command channel. Each subscriber gets its own bounded queue;
//! publishing never waits on a subscriber, and a subscriber whose queue is
//! full is dropped as if it had disconnected.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Pending snapshots a subscriber may fall behind by before it is dropped.
pub const SUBSCRIBER_QUEUE: usize = 16;

enum Command {
    Subscribe {
        id: u64,
        tx: mpsc::Sender<Arc<str>>,
    },
    Unsubscribe(u64),
    Publish(Arc<str>),
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the coordinator task. Cheap to clone.
///
/// The coordinator stops once every `Broadcaster` clone is dropped, closing
/// all remaining subscriptions.
#[derive(Clone)]
pub struct Broadcaster {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    queue_size: usize,
}

impl Broadcaster {
    /// Spawn a coordinator. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_queue_size(SUBSCRIBER_QUEUE)
    }

    pub fn with_queue_size(queue_size: usize) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_hub(rx));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            queue_size: queue_size.max(1),
        }
    }

    /// Register a new subscriber. It receives every payload published after
    /// this call returns, in publish order.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_size);
        if self.commands.send(Command::Subscribe { id, tx }).is_err() {
            debug!(subscriber = id, "Broadcaster stopped, subscription closed");
        }
        Subscription {
            id,
            rx,
            commands: self.commands.downgrade(),
        }
    }

    /// Remove a subscriber and close its queue. Unknown IDs are ignored.
    pub fn unsubscribe(&self, id: u64) {
        let _ = self.commands.send(Command::Unsubscribe(id));
    }

    /// Queue `payload` for every current subscriber. Never blocks.
    pub fn publish(&self, payload: impl Into<Arc<str>>) {
        let _ = self.commands.send(Command::Publish(payload.into()));
    }

    /// Number of live subscribers as seen by the coordinator.
    pub async fn subscriber_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Count { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_hub(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut subscribers: HashMap<u64, mpsc::Sender<Arc<str>>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Subscribe { id, tx } => {
                subscribers.insert(id, tx);
                debug!(subscriber = id, total = subscribers.len(), "Subscriber connected");
            }
            Command::Unsubscribe(id) => {
                if subscribers.remove(&id).is_some() {
                    debug!(subscriber = id, total = subscribers.len(), "Subscriber disconnected");
                }
            }
            Command::Publish(payload) => {
                subscribers.retain(|id, tx| match tx.try_send(payload.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(subscriber = *id, "Subscriber queue full, dropping subscriber");
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscriber = *id, "Subscriber gone");
                        false
                    }
                });
            }
            Command::Count { reply } => {
                let _ = reply.send(subscribers.len());
            }
        }
    }
    debug!("Broadcaster stopped");
}

/// Receiving end of one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<str>>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next payload, or `None` once the subscriber was dropped by the hub or
    /// the hub stopped.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Arc<str>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Unsubscribe(self.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_in_order() {
        let hub = Broadcaster::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish("one");
        hub.publish("two");

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.as_deref(), Some("one"));
            assert_eq!(sub.recv().await.as_deref(), Some("two"));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_payloads() {
        let hub = Broadcaster::new();
        hub.publish("early");
        let mut sub = hub.subscribe();
        hub.publish("late");
        assert_eq!(sub.recv().await.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = Broadcaster::new();
        let sub = hub.subscribe();
        let _other = hub.subscribe();
        assert_eq!(hub.subscriber_count().await, 2);

        drop(sub);
        assert_eq!(hub.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_explicit_unsubscribe_closes_queue() {
        let hub = Broadcaster::new();
        let mut sub = hub.subscribe();
        hub.unsubscribe(sub.id());
        hub.unsubscribe(sub.id());
        assert_eq!(sub.recv().await, None);
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_full_subscriber_is_dropped_without_blocking() {
        let hub = Broadcaster::with_queue_size(2);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.publish("1");
        assert_eq!(fast.recv().await.as_deref(), Some("1"));
        hub.publish("2");
        assert_eq!(fast.recv().await.as_deref(), Some("2"));
        // `slow` never reads; its third payload overflows the queue.
        hub.publish("3");
        assert_eq!(fast.recv().await.as_deref(), Some("3"));

        assert_eq!(hub.subscriber_count().await, 1);
        assert_eq!(slow.recv().await.as_deref(), Some("1"));
        assert_eq!(slow.recv().await.as_deref(), Some("2"));
        assert_eq!(slow.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        let hub = Broadcaster::new();
        let sub = hub.subscribe();
        hub.publish("x");
        hub.publish("y");

        let got: Vec<Arc<str>> = tokio::time::timeout(Duration::from_secs(1), sub.take(2).collect())
            .await
            .unwrap();
        assert_eq!(got, vec![Arc::from("x"), Arc::from("y")]);
    }

    #[tokio::test]
    async fn test_hub_stops_when_broadcaster_dropped() {
        let hub = Broadcaster::new();
        let mut sub = hub.subscribe();
        drop(hub);
        assert_eq!(sub.recv().await, None);
    }
}
