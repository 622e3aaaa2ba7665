use serde::{Deserialize, Serialize};

/// Membership changes announced to live connections
///
/// Events are immutable facts, produced by the room service only after the
/// store writes for the change have completed. They are handed straight to
/// the broadcast dispatcher and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    /// A user became a member of the room
    Joined { room_id: String, user_id: String },
    /// A user's membership in the room ended
    Left { room_id: String, user_id: String },
}

impl MembershipEvent {
    /// The room whose subscribers should hear about this event
    pub fn room_id(&self) -> &str {
        match self {
            MembershipEvent::Joined { room_id, .. } | MembershipEvent::Left { room_id, .. } => {
                room_id
            }
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            MembershipEvent::Joined { user_id, .. } | MembershipEvent::Left { user_id, .. } => {
                user_id
            }
        }
    }

    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            MembershipEvent::Joined { .. } => "joined",
            MembershipEvent::Left { .. } => "left",
        }
    }
}
