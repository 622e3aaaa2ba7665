use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};

use super::types::{
    CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, JoinRoomResponse, MemberInfo,
    RoomInfo, TypingResponse,
};
use crate::shared::{AppError, AppState};

/// HTTP handler for creating a new room
///
/// POST /rooms
#[instrument(name = "create_room", skip(state, request), fields(name = %request.name))]
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, AppError> {
    info!(name = %request.name, creator_id = %request.creator_id, "Creating new room");

    let room = state
        .room_service
        .create_room(request.name, request.creator_id)
        .await?;

    Ok(Json(CreateRoomResponse {
        room_id: room.id,
        name: room.name,
    }))
}

/// HTTP handler for joining a room
///
/// POST /rooms/:room_id/join
#[instrument(name = "join_room", skip(state, request), fields(user_id = %request.user_id))]
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<JoinRoomResponse>, AppError> {
    info!(room_id = %room_id, user_id = %request.user_id, "Join requested");

    let status = state
        .room_service
        .join_room(&room_id, &request.user_id)
        .await?;

    Ok(Json(JoinRoomResponse { status }))
}

/// HTTP handler for listing all rooms
///
/// GET /rooms
pub async fn list_rooms(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoomInfo>>, AppError> {
    let rooms = state.room_service.list_rooms().await?;
    Ok(Json(rooms.into_iter().map(RoomInfo::from).collect()))
}

/// HTTP handler for listing a room's members with their live status
///
/// GET /rooms/:room_id/members
#[instrument(name = "room_members", skip(state))]
pub async fn room_members(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<MemberInfo>>, AppError> {
    let members = state.room_service.list_members(&room_id).await?;

    let mut infos = Vec::with_capacity(members.len());
    for member in members {
        let presence = state.registry.user_presence(&member.user_id).await;
        infos.push(MemberInfo {
            user_id: member.user_id,
            role: member.role,
            online: presence.online,
            last_seen: presence.last_seen,
        });
    }

    Ok(Json(infos))
}

/// HTTP handler for listing who is typing in a room right now
///
/// GET /rooms/:room_id/typing
pub async fn room_typing(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<TypingResponse>, AppError> {
    state
        .room_service
        .get_room(&room_id)
        .await?
        .ok_or_else(|| AppError::RoomNotFound(room_id.clone()))?;

    let user_ids = state.typing.active_typists(&room_id);
    Ok(Json(TypingResponse { user_ids }))
}
