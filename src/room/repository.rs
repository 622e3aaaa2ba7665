use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{MemberRole, MembershipModel, NewRoom, RoomModel};
use crate::shared::AppError;

/// Trait for membership store operations
///
/// The store is the single source of truth for rooms and memberships. The
/// uniqueness constraint on (room_id, user_id) is the serialization point
/// for concurrent joins: whichever writer inserts second gets
/// `DuplicateMembership`.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_room_by_name(&self, name: &str) -> Result<Option<RoomModel>, AppError>;

    async fn find_room_by_id(&self, room_id: &str) -> Result<Option<RoomModel>, AppError>;

    /// Persists a new room, assigning its identifier. The member list starts
    /// with the creator. Fails with `RoomExists` if the name is taken.
    async fn insert_room(&self, room: NewRoom) -> Result<RoomModel, AppError>;

    /// Removes a room and its memberships; safe to call for a room that is
    /// already gone
    async fn delete_room(&self, room_id: &str) -> Result<(), AppError>;

    async fn list_rooms(&self) -> Result<Vec<RoomModel>, AppError>;

    async fn find_membership(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<MembershipModel>, AppError>;

    /// Fails with `DuplicateMembership` if the (room_id, user_id) pair
    /// already exists
    async fn insert_membership(
        &self,
        membership: &MembershipModel,
    ) -> Result<MembershipModel, AppError>;

    /// Adds the user to the room's member list; a no-op if already present
    async fn append_member(&self, room_id: &str, user_id: &str) -> Result<(), AppError>;

    async fn list_members(&self, room_id: &str) -> Result<Vec<MembershipModel>, AppError>;
}

#[derive(Default)]
struct StoreInner {
    rooms: HashMap<String, RoomModel>,
    // keyed by (room_id, user_id) to mirror the database primary key
    memberships: HashMap<(String, String), MembershipModel>,
}

/// In-memory implementation of MembershipStore for development and testing
pub struct InMemoryMembershipStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }
}

impl Default for InMemoryMembershipStore {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_room_id() -> String {
    petname::Petnames::default().generate_one(2, "-")
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn find_room_by_name(&self, name: &str) -> Result<Option<RoomModel>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rooms.values().find(|room| room.name == name).cloned())
    }

    async fn find_room_by_id(&self, room_id: &str) -> Result<Option<RoomModel>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rooms.get(room_id).cloned())
    }

    #[instrument(skip(self))]
    async fn insert_room(&self, room: NewRoom) -> Result<RoomModel, AppError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.rooms.values().any(|existing| existing.name == room.name) {
            debug!(name = %room.name, "Room name already taken");
            return Err(AppError::RoomExists(room.name));
        }

        let mut id = generate_room_id();
        while inner.rooms.contains_key(&id) {
            id = generate_room_id();
        }

        let model = RoomModel {
            id: id.clone(),
            name: room.name,
            creator_id: room.creator_id.clone(),
            member_ids: vec![room.creator_id],
            created_at: Utc::now(),
        };
        inner.rooms.insert(id, model.clone());

        debug!(room_id = %model.id, "Room inserted");
        Ok(model)
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.rooms.remove(room_id);
        inner
            .memberships
            .retain(|(member_room, _), _| member_room != room_id);
        debug!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomModel>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut rooms: Vec<RoomModel> = inner.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rooms)
    }

    async fn find_membership(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<MembershipModel>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .memberships
            .get(&(room_id.to_string(), user_id.to_string()))
            .cloned())
    }

    #[instrument(skip(self, membership), fields(room_id = %membership.room_id, user_id = %membership.user_id))]
    async fn insert_membership(
        &self,
        membership: &MembershipModel,
    ) -> Result<MembershipModel, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (membership.room_id.clone(), membership.user_id.clone());

        if inner.memberships.contains_key(&key) {
            debug!("Membership already exists");
            return Err(AppError::DuplicateMembership {
                room_id: membership.room_id.clone(),
                user_id: membership.user_id.clone(),
            });
        }

        inner.memberships.insert(key, membership.clone());
        debug!("Membership inserted");
        Ok(membership.clone())
    }

    async fn append_member(&self, room_id: &str, user_id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let room = inner
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;
        room.add_member(user_id.to_string());
        Ok(())
    }

    async fn list_members(&self, room_id: &str) -> Result<Vec<MembershipModel>, AppError> {
        let inner = self.inner.lock().unwrap();
        if !inner.rooms.contains_key(room_id) {
            return Err(AppError::RoomNotFound(room_id.to_string()));
        }
        let mut members: Vec<MembershipModel> = inner
            .memberships
            .values()
            .filter(|membership| membership.room_id == room_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(members)
    }
}

/// PostgreSQL implementation of MembershipStore
///
/// Schema lives in `migrations/`. The primary key on
/// room_memberships(room_id, user_id) backs `DuplicateMembership`; the
/// unique index on rooms(name) backs `RoomExists`.
pub struct PostgresMembershipStore {
    pool: PgPool,
}

impl PostgresMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn membership_from_row(row: &sqlx::postgres::PgRow) -> Result<MembershipModel, AppError> {
    let role: String = row.get("role");
    let role = MemberRole::from_str(&role)
        .map_err(|_| AppError::StoreUnavailable(format!("unknown role '{}' in store", role)))?;
    Ok(MembershipModel {
        room_id: row.get("room_id"),
        user_id: row.get("user_id"),
        role,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl MembershipStore for PostgresMembershipStore {
    async fn find_room_by_name(&self, name: &str) -> Result<Option<RoomModel>, AppError> {
        sqlx::query_as::<_, RoomModel>(
            "SELECT id, name, creator_id, member_ids, created_at FROM rooms WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to look up room by name");
            AppError::StoreUnavailable(e.to_string())
        })
    }

    async fn find_room_by_id(&self, room_id: &str) -> Result<Option<RoomModel>, AppError> {
        sqlx::query_as::<_, RoomModel>(
            "SELECT id, name, creator_id, member_ids, created_at FROM rooms WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to look up room by id");
            AppError::StoreUnavailable(e.to_string())
        })
    }

    #[instrument(skip(self))]
    async fn insert_room(&self, room: NewRoom) -> Result<RoomModel, AppError> {
        // The generated id can collide with an existing room; retry with a
        // fresh one. A collision on the name is a real conflict.
        for attempt in 0..3 {
            let id = generate_room_id();
            let created_at = Utc::now();

            let result = sqlx::query(
                "INSERT INTO rooms (id, name, creator_id, member_ids, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&id)
            .bind(&room.name)
            .bind(&room.creator_id)
            .bind(vec![room.creator_id.clone()])
            .bind(created_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    debug!(room_id = %id, "Room inserted");
                    return Ok(RoomModel {
                        id,
                        name: room.name,
                        creator_id: room.creator_id.clone(),
                        member_ids: vec![room.creator_id],
                        created_at,
                    });
                }
                Err(e) => {
                    if let Some(db_error) = e.as_database_error() {
                        if db_error.kind() == sqlx::error::ErrorKind::UniqueViolation {
                            match db_error.constraint() {
                                Some("rooms_name_key") => {
                                    debug!(name = %room.name, "Room name already taken");
                                    return Err(AppError::RoomExists(room.name));
                                }
                                Some("rooms_pkey") => {
                                    warn!(room_id = %id, attempt, "Room id collision, retrying");
                                    continue;
                                }
                                _ => {}
                            }
                        }
                    }
                    warn!(error = %e, "Failed to insert room");
                    return Err(AppError::StoreUnavailable(e.to_string()));
                }
            }
        }

        Err(AppError::StoreUnavailable(
            "could not assign a unique room id".to_string(),
        ))
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), AppError> {
        // Memberships go with the room via ON DELETE CASCADE
        sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(room_id = %room_id, error = %e, "Failed to delete room");
                AppError::StoreUnavailable(e.to_string())
            })?;
        debug!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomModel>, AppError> {
        sqlx::query_as::<_, RoomModel>(
            "SELECT id, name, creator_id, member_ids, created_at FROM rooms ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to list rooms");
            AppError::StoreUnavailable(e.to_string())
        })
    }

    async fn find_membership(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<MembershipModel>, AppError> {
        let row = sqlx::query(
            "SELECT room_id, user_id, role, created_at FROM room_memberships
             WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to look up membership");
            AppError::StoreUnavailable(e.to_string())
        })?;

        match row {
            Some(row) => Ok(Some(membership_from_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, membership), fields(room_id = %membership.room_id, user_id = %membership.user_id))]
    async fn insert_membership(
        &self,
        membership: &MembershipModel,
    ) -> Result<MembershipModel, AppError> {
        sqlx::query(
            "INSERT INTO room_memberships (room_id, user_id, role, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&membership.room_id)
        .bind(&membership.user_id)
        .bind(membership.role.to_string())
        .bind(membership.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_error) = e.as_database_error() {
                if db_error.kind() == sqlx::error::ErrorKind::UniqueViolation {
                    debug!("Membership already exists");
                    return AppError::DuplicateMembership {
                        room_id: membership.room_id.clone(),
                        user_id: membership.user_id.clone(),
                    };
                }
            }
            warn!(error = %e, "Failed to insert membership");
            AppError::StoreUnavailable(e.to_string())
        })?;

        debug!("Membership inserted");
        Ok(membership.clone())
    }

    async fn append_member(&self, room_id: &str, user_id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE rooms SET member_ids = array_append(member_ids, $2)
             WHERE id = $1 AND NOT (member_ids @> ARRAY[$2])",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(room_id = %room_id, error = %e, "Failed to append member");
            AppError::StoreUnavailable(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            // either the user was already listed, or the room is gone
            let exists = sqlx::query("SELECT 1 FROM rooms WHERE id = $1")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
            if exists.is_none() {
                return Err(AppError::RoomNotFound(room_id.to_string()));
            }
        }

        Ok(())
    }

    async fn list_members(&self, room_id: &str) -> Result<Vec<MembershipModel>, AppError> {
        let rows = sqlx::query(
            "SELECT room_id, user_id, role, created_at FROM room_memberships
             WHERE room_id = $1 ORDER BY user_id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(room_id = %room_id, error = %e, "Failed to list members");
            AppError::StoreUnavailable(e.to_string())
        })?;

        if rows.is_empty() {
            // every room carries at least its creator, so verify it exists
            let exists = sqlx::query("SELECT 1 FROM rooms WHERE id = $1")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
            if exists.is_none() {
                return Err(AppError::RoomNotFound(room_id.to_string()));
            }
        }

        rows.iter().map(membership_from_row).collect()
    }
}
