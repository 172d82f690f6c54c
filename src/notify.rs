use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-court change feeds. A booking page subscribes to
/// its court and sees every lock, booking, and block as it lands, which is
/// what keeps the availability grid live without polling.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a court's events. Creates the channel if needed.
    pub fn subscribe(&self, court_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(court_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, court_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&court_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a court's channel (when the court is removed).
    pub fn remove(&self, court_id: &Ulid) {
        self.channels.remove(court_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let court_id = Ulid::new();
        let mut rx = hub.subscribe(court_id);

        let event = Event::CourtRegistered {
            id: court_id,
            owner_id: Ulid::new(),
            name: "Court 1".into(),
            base_price: Decimal::new(1000, 0),
            hours: None,
        };
        hub.send(court_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let court_id = Ulid::new();
        // No subscriber — should not panic
        hub.send(court_id, &Event::CourtRemoved { id: court_id });
    }

    #[tokio::test]
    async fn removed_channel_stops_delivering() {
        let hub = NotifyHub::new();
        let court_id = Ulid::new();
        let mut rx = hub.subscribe(court_id);
        hub.remove(&court_id);
        hub.send(court_id, &Event::CourtRemoved { id: court_id });
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }
}
