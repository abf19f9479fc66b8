//! Broadcast bus for channel lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Publishing
//! never blocks and never fails visibly, so it is safe to publish while the
//! channel lock is held; a bus with no subscribers simply drops events.

use tokio::sync::broadcast;

use crate::events::Event;

/// Broadcast channel for lifecycle events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Errors are ignored if there are no active subscribers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Subscribes to the bus and returns a new receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::StateChanged).with_channel(1));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::StateChanged);
        assert_eq!(ev.channel, Some(1));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::TimerFired));
    }
}
