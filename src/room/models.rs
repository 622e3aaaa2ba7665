use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display, EnumString};

/// Role a user holds within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

/// Database model for rooms
///
/// `member_ids` is a projection of the membership records, kept with set
/// semantics: appending a user who is already present changes nothing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RoomModel {
    /// Store-assigned identifier, a readable two-word name like "sweet-lark"
    pub id: String,
    /// Display name, unique across all rooms
    pub name: String,
    pub creator_id: String,
    pub member_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl RoomModel {
    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|member| member == user_id)
    }

    /// Adds a user to the member list; a no-op if already present
    pub fn add_member(&mut self, user_id: String) {
        if !self.has_member(&user_id) {
            self.member_ids.push(user_id);
        }
    }
}

/// Parameters for inserting a room; the store assigns the identifier
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub creator_id: String,
}

/// Database model for room memberships
///
/// The (room_id, user_id) pair is the primary key. Its uniqueness is what
/// serializes concurrent joins for the same user and room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipModel {
    pub room_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

impl MembershipModel {
    pub fn new(room_id: String, user_id: String, role: MemberRole) -> Self {
        Self {
            room_id,
            user_id,
            role,
            created_at: Utc::now(),
        }
    }
}
