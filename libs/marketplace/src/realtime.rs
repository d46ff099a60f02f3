//! Room-based realtime relay
//!
//! Clients join rooms keyed `chat-<conversationId>` or `booking-<bookingId>`
//! and every frame published to a room is fanned out to all of its members.
//! Fan-out uses one tokio broadcast channel per room: publishers never wait,
//! and a member that falls more than the room capacity behind sees
//! `RecvError::Lagged` and is expected to disconnect.
//!
//! Nothing is persisted or replayed.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

/// Events buffered per room before slow members start lagging
pub const ROOM_CAPACITY: usize = 256;

pub const USER_JOINED: &str = "user-joined";
pub const BOOKING_UPDATED: &str = "booking-updated";

pub fn chat_room(conversation_id: &str) -> String {
    format!("chat-{}", conversation_id)
}

pub fn booking_room(booking_id: Uuid) -> String {
    format!("booking-{}", booking_id)
}

/// Wire frame in both directions: `{"event": <name>, "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// A frame published to a room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEvent {
    pub room: String,
    pub frame: Frame,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRef {
    pub booking_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRef {
    pub booking_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
}

/// Events a client may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinChat(ChatRef),
    JoinBooking(BookingRef),
    SendMessage(ChatRef),
    Typing(ChatRef),
    LocationUpdate(LocationRef),
}

impl ClientMessage {
    /// Parse a text frame into the message and the frame to relay.
    ///
    /// Returns `None` for anything that is not a well-formed client event.
    pub fn parse(text: &str) -> Option<(ClientMessage, Frame)> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Dropping non-JSON frame");
                return None;
            }
        };

        let message = match ClientMessage::deserialize(&value) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Dropping unrecognised frame");
                return None;
            }
        };

        let frame = serde_json::from_value(value).ok()?;
        Some((message, frame))
    }

    /// Room the message targets
    pub fn room(&self) -> String {
        match self {
            ClientMessage::JoinChat(c) | ClientMessage::SendMessage(c) | ClientMessage::Typing(c) => {
                chat_room(&c.conversation_id)
            }
            ClientMessage::JoinBooking(b) => booking_room(b.booking_id),
            ClientMessage::LocationUpdate(l) => booking_room(l.booking_id),
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(
            self,
            ClientMessage::JoinChat(_) | ClientMessage::JoinBooking(_)
        )
    }
}

/// Outcome of handling one client message
pub enum Dispatch {
    /// The client joined `room`; forward `receiver` to it
    Joined {
        room: String,
        receiver: broadcast::Receiver<Arc<RoomEvent>>,
    },
    /// The frame was relayed to this many members
    Relayed(usize),
}

/// Registry of live rooms
#[derive(Clone)]
pub struct RoomHub {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<Arc<RoomEvent>>>>>,
    capacity: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self::with_capacity(ROOM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Join a room, creating it on first use
    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<Arc<RoomEvent>> {
        if let Some(sender) = self.rooms.read().await.get(room) {
            return sender.subscribe();
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Fan a frame out to every member of `room`, returning how many
    /// received it. Rooms without members are dropped.
    pub async fn publish(&self, room: &str, frame: Frame) -> usize {
        let event = Arc::new(RoomEvent {
            room: room.to_string(),
            frame,
        });

        let sent = match self.rooms.read().await.get(room) {
            Some(sender) => sender.send(event).ok(),
            None => return 0,
        };

        match sent {
            Some(count) => count,
            None => {
                let mut rooms = self.rooms.write().await;
                if rooms.get(room).is_some_and(|s| s.receiver_count() == 0) {
                    rooms.remove(room);
                    debug!(room, "Dropped empty room");
                }
                0
            }
        }
    }

    /// Handle one message from `user_id`
    pub async fn dispatch(&self, user_id: Uuid, message: &ClientMessage, frame: Frame) -> Dispatch {
        let room = message.room();

        if message.is_join() {
            let receiver = self.subscribe(&room).await;
            self.publish(
                &room,
                Frame::new(USER_JOINED, json!({ "userId": user_id, "room": room })),
            )
            .await;
            Dispatch::Joined { room, receiver }
        } else {
            Dispatch::Relayed(self.publish(&room, frame).await)
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[test]
    fn test_parse_known_events() {
        let (message, frame) =
            ClientMessage::parse(r#"{"event":"join-chat","data":{"conversationId":"c1"}}"#)
                .unwrap();
        assert_eq!(
            message,
            ClientMessage::JoinChat(ChatRef {
                conversation_id: "c1".to_string()
            })
        );
        assert_eq!(frame.event, "join-chat");
        assert_eq!(message.room(), "chat-c1");

        let booking_id = Uuid::new_v4();
        let text = json!({
            "event": "location-update",
            "data": {"bookingId": booking_id, "latitude": 12.97, "longitude": 77.59}
        })
        .to_string();
        let (message, frame) = ClientMessage::parse(&text).unwrap();
        assert_eq!(message.room(), booking_room(booking_id));
        assert!(!message.is_join());
        assert_eq!(frame.data["latitude"], 12.97);
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        assert!(ClientMessage::parse("not json").is_none());
        assert!(ClientMessage::parse(r#"{"event":"shutdown","data":{}}"#).is_none());
        assert!(ClientMessage::parse(r#"{"event":"join-booking","data":{"bookingId":"nope"}}"#).is_none());
        assert!(
            ClientMessage::parse(r#"{"event":"location-update","data":{"bookingId":"00000000-0000-0000-0000-000000000000"}}"#)
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_publish_reaches_every_member() {
        let hub = RoomHub::new();
        let mut a = hub.subscribe("chat-1").await;
        let mut b = hub.subscribe("chat-1").await;
        let mut other = hub.subscribe("chat-2").await;

        let delivered = hub
            .publish("chat-1", Frame::new("send-message", json!({"text": "hi"})))
            .await;
        assert_eq!(delivered, 2);

        assert_eq!(a.recv().await.unwrap().frame.data["text"], "hi");
        assert_eq!(b.recv().await.unwrap().frame.data["text"], "hi");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_to_empty_room_drops_it() {
        let hub = RoomHub::new();
        assert_eq!(hub.publish("chat-x", Frame::new("typing", Value::Null)).await, 0);

        let receiver = hub.subscribe("chat-x").await;
        drop(receiver);
        assert_eq!(hub.room_count().await, 1);

        hub.publish("chat-x", Frame::new("typing", Value::Null)).await;
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_announces_user() {
        let hub = RoomHub::new();
        let user = Uuid::new_v4();
        let (message, frame) =
            ClientMessage::parse(r#"{"event":"join-chat","data":{"conversationId":"c9"}}"#)
                .unwrap();

        match hub.dispatch(user, &message, frame).await {
            Dispatch::Joined { room, mut receiver } => {
                assert_eq!(room, "chat-c9");
                let event = receiver.recv().await.unwrap();
                assert_eq!(event.frame.event, USER_JOINED);
                assert_eq!(event.frame.data["userId"], user.to_string());
            }
            Dispatch::Relayed(_) => panic!("join should subscribe"),
        }
    }

    #[tokio::test]
    async fn test_slow_member_lags_without_blocking_publisher() {
        let hub = RoomHub::with_capacity(2);
        let mut slow = hub.subscribe("booking-1").await;

        for i in 0..5 {
            hub.publish("booking-1", Frame::new("typing", json!(i))).await;
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
    }
}
