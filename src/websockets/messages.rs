use serde::{Deserialize, Serialize};

use crate::event::MembershipEvent;

/// Messages sent from the client over an established WebSocket
///
/// The wire format is a tagged JSON object, for example
/// `{"type":"subscribe","room_id":"sweet-lark"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Set (or replace) the connection's current room subscription
    Subscribe { room_id: String },
    /// Clear the current room subscription
    Unsubscribe,
    /// The user started typing in their current room
    TypingStart,
    /// The user stopped typing
    TypingStop,
}

/// Messages pushed to the client, one discrete JSON text frame each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    UserJoined { room_id: String, user_id: String },
    UserLeft { room_id: String, user_id: String },
    Error { message: String },
}

impl From<&MembershipEvent> for ServerMessage {
    fn from(event: &MembershipEvent) -> Self {
        match event {
            MembershipEvent::Joined { room_id, user_id } => ServerMessage::UserJoined {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
            },
            MembershipEvent::Left { room_id, user_id } => ServerMessage::UserLeft {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
            },
        }
    }
}
