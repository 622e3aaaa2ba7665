use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{MemberRole, RoomModel};
use super::service::JoinOutcome;

/// Request payload for creating a room
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub creator_id: String,
}

/// Response for room creation
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub name: String,
}

/// Request payload for joining a room
#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub user_id: String,
}

/// Response for a join request
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub status: JoinOutcome,
}

/// Summary of a room for listings
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: String,
    pub name: String,
    pub creator_id: String,
    pub member_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<RoomModel> for RoomInfo {
    fn from(room: RoomModel) -> Self {
        Self {
            room_id: room.id,
            name: room.name,
            creator_id: room.creator_id,
            member_count: room.member_ids.len(),
            created_at: room.created_at,
        }
    }
}

/// A room member with live presence attached
#[derive(Debug, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: String,
    pub role: MemberRole,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Users currently typing in a room
#[derive(Debug, Serialize, Deserialize)]
pub struct TypingResponse {
    pub user_ids: Vec<String>,
}
