use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::models::{MemberRole, MembershipModel, NewRoom, RoomModel};
use super::repository::MembershipStore;
use crate::event::{BroadcastDispatcher, MembershipEvent};
use crate::shared::AppError;

/// Outcome of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    /// The user was added to the room and subscribers were notified
    Joined,
    /// The user was already a member; nothing changed, nothing broadcast
    AlreadyMember,
}

/// Service for room creation and membership
pub struct RoomService {
    store: Arc<dyn MembershipStore>,
    dispatcher: Arc<BroadcastDispatcher>,
}

impl RoomService {
    pub fn new(store: Arc<dyn MembershipStore>, dispatcher: Arc<BroadcastDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Creates a room owned by `creator_id`
    ///
    /// The creator is a member from the start, with the admin role. The
    /// room record and the creator's membership form one logical unit: if
    /// the membership write fails, the room is deleted again and the whole
    /// operation reports a retryable failure.
    #[instrument(skip(self))]
    pub async fn create_room(
        &self,
        name: String,
        creator_id: String,
    ) -> Result<RoomModel, AppError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidRequest(
                "room name must not be empty".to_string(),
            ));
        }
        if creator_id.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "creator_id must not be empty".to_string(),
            ));
        }

        if self.store.find_room_by_name(&name).await?.is_some() {
            info!(name = %name, "Room name already taken");
            return Err(AppError::RoomExists(name));
        }

        let room = self
            .store
            .insert_room(NewRoom {
                name,
                creator_id: creator_id.clone(),
            })
            .await?;

        let membership = MembershipModel::new(room.id.clone(), creator_id, MemberRole::Admin);
        if let Err(e) = self.store.insert_membership(&membership).await {
            error!(room_id = %room.id, error = %e, "Creator membership write failed, deleting room");
            if let Err(cleanup) = self.store.delete_room(&room.id).await {
                error!(room_id = %room.id, error = %cleanup, "Compensating room delete failed");
            }
            return Err(match e {
                // a fresh room id cannot already carry this membership
                AppError::DuplicateMembership { .. } => {
                    AppError::StoreUnavailable("creator membership conflict".to_string())
                }
                other => other,
            });
        }

        info!(room_id = %room.id, name = %room.name, "Room created");
        Ok(room)
    }

    /// Adds `user_id` to a room and notifies the room's live connections
    ///
    /// Idempotent: joining a room the user already belongs to returns
    /// `AlreadyMember` without writing or broadcasting anything. Concurrent
    /// joins for the same (room, user) pair are serialized by the store's
    /// uniqueness constraint, so at most one caller observes `Joined`.
    #[instrument(skip(self))]
    pub async fn join_room(&self, room_id: &str, user_id: &str) -> Result<JoinOutcome, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "user_id must not be empty".to_string(),
            ));
        }

        let room = self
            .store
            .find_room_by_id(room_id)
            .await?
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;

        if self.store.find_membership(room_id, user_id).await?.is_some() {
            if !room.has_member(user_id) {
                // membership records are authoritative; repair the room's
                // member list when an earlier join got cut short
                warn!(room_id = %room_id, user_id = %user_id, "Member list out of step with memberships, repairing");
                self.store.append_member(room_id, user_id).await?;
            }
            debug!(room_id = %room_id, user_id = %user_id, "User already a member");
            return Ok(JoinOutcome::AlreadyMember);
        }

        let membership =
            MembershipModel::new(room_id.to_string(), user_id.to_string(), MemberRole::Member);
        match self.store.insert_membership(&membership).await {
            Ok(_) => {}
            Err(AppError::DuplicateMembership { .. }) => {
                info!(room_id = %room_id, user_id = %user_id, "Concurrent join resolved as already a member");
                return Ok(JoinOutcome::AlreadyMember);
            }
            Err(e) => return Err(e),
        }

        // the membership is durable from here on; if the append fails the
        // caller retries and lands in the repair path above
        self.store.append_member(room_id, user_id).await?;

        self.dispatcher
            .dispatch(MembershipEvent::Joined {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            })
            .await;

        info!(room_id = %room_id, user_id = %user_id, "User joined room");
        Ok(JoinOutcome::Joined)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<RoomModel>, AppError> {
        self.store.find_room_by_id(room_id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomModel>, AppError> {
        self.store.list_rooms().await
    }

    pub async fn list_members(&self, room_id: &str) -> Result<Vec<MembershipModel>, AppError> {
        self.store.list_members(room_id).await
    }
}
