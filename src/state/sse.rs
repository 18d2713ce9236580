use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

/// Per-session fan-out: one [`SseHub`] per session code, created lazily when
/// the first subscriber or publisher touches the room.
///
/// Delivery is best effort. Publishing to a room nobody subscribed to is a
/// no-op, and slow subscribers drop lagged events rather than block the
/// publisher.
pub struct RoomBus {
    rooms: DashMap<String, SseHub>,
    channel_capacity: usize,
}

impl RoomBus {
    /// Build an empty bus; `channel_capacity` bounds each room's backlog.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            channel_capacity,
        }
    }

    /// Subscribe to the room for `code`, creating it if needed.
    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<ServerEvent> {
        self.rooms
            .entry(code.to_owned())
            .or_insert_with(|| SseHub::new(self.channel_capacity))
            .subscribe()
    }

    /// Publish an event to every subscriber of `code`.
    pub fn publish(&self, code: &str, event: ServerEvent) {
        if let Some(hub) = self.rooms.get(code) {
            hub.broadcast(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> ServerEvent {
        ServerEvent {
            event: Some(name.to_owned()),
            data: "{}".to_owned(),
        }
    }

    #[tokio::test]
    async fn events_reach_only_the_matching_room() {
        let bus = RoomBus::new(8);
        let mut first = bus.subscribe("AAAAAA");
        let mut second = bus.subscribe("BBBBBB");

        bus.publish("AAAAAA", event("ping"));

        let received = first.recv().await.unwrap();
        assert_eq!(received.event.as_deref(), Some("ping"));
        assert!(second.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_to_an_empty_room_is_a_noop() {
        let bus = RoomBus::new(8);
        bus.publish("CCCCCC", event("ping"));
    }
}
