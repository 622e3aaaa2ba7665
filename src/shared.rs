use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::room::repository::MembershipStore;
use crate::room::RoomService;
use crate::websockets::registry::ConnectionRegistry;
use crate::websockets::typing::TypingTracker;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub membership_store: Arc<dyn MembershipStore>,
    pub room_service: Arc<RoomService>,
    pub registry: Arc<dyn ConnectionRegistry>,
    pub typing: Arc<TypingTracker>,
}

impl AppState {
    pub fn new(
        membership_store: Arc<dyn MembershipStore>,
        room_service: Arc<RoomService>,
        registry: Arc<dyn ConnectionRegistry>,
        typing: Arc<TypingTracker>,
    ) -> Self {
        Self {
            membership_store,
            room_service,
            registry,
            typing,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("room name '{0}' is already taken")]
    RoomExists(String),

    #[error("room '{0}' not found")]
    RoomNotFound(String),

    #[error("user '{user_id}' already has a membership in room '{room_id}'")]
    DuplicateMembership { room_id: String, user_id: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::RoomExists(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::RoomNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::DuplicateMembership { .. } => (StatusCode::CONFLICT, self.to_string()),
            // the underlying cause stays in the logs, not on the wire
            AppError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "temporarily unavailable, retry later".to_string(),
            ),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
