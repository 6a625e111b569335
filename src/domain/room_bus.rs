//! Per-session broadcast rooms for event fan-out.
//!
//! [`RoomBus`] keeps one [`tokio::sync::broadcast`] channel per session
//! room. Every connection bound to a session subscribes to that room and
//! receives audience-tagged [`Envelope`]s; the connection applies the
//! audience filter before writing to its socket.
//!
//! ```text
//! Room: Q7K2MD          Room: 8PXW41
//! ├── connection-a      ├── connection-d
//! ├── connection-b      └── connection-e
//! └── connection-c
//! ```

use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};

use super::session_event::{Audience, Envelope, SessionEvent};
use super::SessionCode;

/// Broadcast bus with one room per session.
///
/// Rooms are created lazily on first subscribe and removed once the last
/// receiver is gone. Broadcasts to rooms with no subscribers are silently
/// dropped — expiry events for abandoned sessions have nobody to tell.
#[derive(Debug)]
pub struct RoomBus {
    rooms: RwLock<HashMap<SessionCode, broadcast::Sender<Envelope>>>,
    channel_capacity: usize,
}

impl RoomBus {
    /// Creates a new bus with the given per-room channel capacity.
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            channel_capacity,
        }
    }

    /// Subscribes to a session room, creating the room if needed.
    pub async fn subscribe(&self, code: &SessionCode) -> broadcast::Receiver<Envelope> {
        let mut rooms = self.rooms.write().await;
        let sender = rooms.entry(code.clone()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.channel_capacity);
            tx
        });
        sender.subscribe()
    }

    /// Publishes an event to a session room with the given audience.
    ///
    /// Returns the number of receivers the envelope reached (before
    /// per-connection audience filtering).
    pub async fn publish(&self, audience: Audience, event: SessionEvent) -> usize {
        let rooms = self.rooms.read().await;
        match rooms.get(event.code()) {
            Some(sender) => sender.send(Envelope { audience, event }).unwrap_or(0),
            None => 0,
        }
    }

    /// Drops a room if it has no remaining receivers.
    ///
    /// Called by connections on teardown; a no-op while members remain.
    pub async fn cleanup(&self, code: &SessionCode) {
        let mut rooms = self.rooms.write().await;
        if let Some(sender) = rooms.get(code)
            && sender.receiver_count() == 0
        {
            rooms.remove(code);
        }
    }

    /// Removes a room unconditionally (session deleted or expired).
    pub async fn remove_room(&self, code: &SessionCode) {
        self.rooms.write().await.remove(code);
    }

    /// Returns the number of connections subscribed to a room.
    pub async fn room_size(&self, code: &SessionCode) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(code).map_or(0, broadcast::Sender::receiver_count)
    }

    /// Returns the number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::ParticipantId;

    fn restart_event(code: &SessionCode) -> SessionEvent {
        SessionEvent::SessionRestarted {
            code: code.clone(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn publish_without_room_returns_zero() {
        let bus = RoomBus::new(16);
        let code = SessionCode::generate();
        let reached = tokio_test::block_on(bus.publish(Audience::Room, restart_event(&code)));
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn subscriber_receives_envelope() {
        let bus = RoomBus::new(16);
        let code = SessionCode::generate();
        let mut rx = bus.subscribe(&code).await;

        bus.publish(Audience::Room, restart_event(&code)).await;

        let envelope = rx.recv().await;
        let Ok(envelope) = envelope else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.event.event_type_str(), "session:restarted");
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let bus = RoomBus::new(16);
        let code_a = SessionCode::generate();
        let code_b = SessionCode::generate();
        let mut rx_a = bus.subscribe(&code_a).await;
        let _rx_b = bus.subscribe(&code_b).await;

        let reached = bus.publish(Audience::Room, restart_event(&code_a)).await;
        assert_eq!(reached, 1);
        assert!(rx_a.recv().await.is_ok());
    }

    #[tokio::test]
    async fn audience_travels_with_envelope() {
        let bus = RoomBus::new(16);
        let code = SessionCode::generate();
        let excluded = ParticipantId::new();
        let mut rx = bus.subscribe(&code).await;

        bus.publish(Audience::RoomExcept(excluded), restart_event(&code))
            .await;

        let Ok(envelope) = rx.recv().await else {
            panic!("expected envelope");
        };
        assert!(!envelope.audience.includes(excluded));
        assert!(envelope.audience.includes(ParticipantId::new()));
    }

    #[tokio::test]
    async fn cleanup_removes_empty_room_only() {
        let bus = RoomBus::new(16);
        let code = SessionCode::generate();
        {
            let _rx = bus.subscribe(&code).await;
            bus.cleanup(&code).await;
            assert_eq!(bus.room_count().await, 1);
        }
        bus.cleanup(&code).await;
        assert_eq!(bus.room_count().await, 0);
    }

    #[tokio::test]
    async fn remove_room_is_unconditional() {
        let bus = RoomBus::new(16);
        let code = SessionCode::generate();
        let _rx = bus.subscribe(&code).await;
        bus.remove_room(&code).await;
        assert_eq!(bus.room_count().await, 0);
    }
}
