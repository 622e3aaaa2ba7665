use async_trait::async_trait;
use axum::{
    extract::{ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use super::registry::{ConnectionId, ConnectionRegistry};
use super::socket::{Connection, MessageHandler};
use super::typing::TypingTracker;
use crate::room::repository::MembershipStore;
use crate::shared::{AppError, AppState};

/// Query parameters for the WebSocket endpoint
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: String,
}

/// Live status payload for a user
#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub user_id: String,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Handles intents received from a connected client
///
/// Subscribe and unsubscribe move the connection between room indexes in
/// the registry; typing intents feed the typing tracker for the
/// connection's current room. A bad or unserviceable intent answers with
/// an error frame on that connection only.
pub struct ClientMessageHandler {
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn MembershipStore>,
    typing: Arc<TypingTracker>,
}

impl ClientMessageHandler {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        store: Arc<dyn MembershipStore>,
        typing: Arc<TypingTracker>,
    ) -> Self {
        Self {
            registry,
            store,
            typing,
        }
    }

    async fn send_error(&self, connection_id: ConnectionId, message: &str) {
        let reply = ServerMessage::Error {
            message: message.to_string(),
        };
        if let Ok(frame) = serde_json::to_string(&reply) {
            self.registry.send_to(connection_id, &frame).await;
        }
    }

    async fn handle_subscribe(&self, connection_id: ConnectionId, user_id: &str, room_id: String) {
        match self.store.find_room_by_id(&room_id).await {
            Ok(Some(_)) => {
                self.registry.subscribe(connection_id, &room_id).await;
                info!(
                    connection_id = %connection_id,
                    user_id = %user_id,
                    room_id = %room_id,
                    "Connection subscribed to room"
                );
            }
            Ok(None) => {
                debug!(room_id = %room_id, "Subscribe to unknown room rejected");
                self.send_error(connection_id, &format!("room '{}' not found", room_id))
                    .await;
            }
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Room lookup failed during subscribe");
                self.send_error(connection_id, "temporarily unavailable, retry later")
                    .await;
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ClientMessageHandler {
    async fn handle_message(&self, connection_id: ConnectionId, user_id: &str, message: String) {
        let parsed = match serde_json::from_str::<ClientMessage>(&message) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    connection_id = %connection_id,
                    user_id = %user_id,
                    error = %e,
                    "Failed to parse client message"
                );
                self.send_error(connection_id, "unrecognized message").await;
                return;
            }
        };

        match parsed {
            ClientMessage::Subscribe { room_id } => {
                self.handle_subscribe(connection_id, user_id, room_id).await;
            }
            ClientMessage::Unsubscribe => {
                if let Some(room_id) = self.registry.current_room(connection_id).await {
                    self.typing.stopped(&room_id, user_id);
                }
                self.registry.unsubscribe(connection_id).await;
                debug!(connection_id = %connection_id, "Connection unsubscribed");
            }
            ClientMessage::TypingStart => match self.registry.current_room(connection_id).await {
                Some(room_id) => self.typing.started(&room_id, user_id),
                None => {
                    debug!(connection_id = %connection_id, "Typing intent without a room ignored")
                }
            },
            ClientMessage::TypingStop => {
                if let Some(room_id) = self.registry.current_room(connection_id).await {
                    self.typing.stopped(&room_id, user_id);
                }
            }
        }
    }
}

/// WebSocket endpoint
///
/// GET /ws?user_id=... upgrades the connection. It starts with no room
/// subscription; the client sends subscribe/unsubscribe intents afterwards.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    if query.user_id.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "user_id must not be empty".to_string(),
        ));
    }

    info!(user_id = %query.user_id, "WebSocket connection requested");
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, query.user_id, state)))
}

/// Handle the upgraded WebSocket connection until it closes
async fn handle_connection(socket: WebSocket, user_id: String, state: AppState) {
    let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel::<String>();

    let connection_id = state.registry.register(user_id.clone(), outbound_sender).await;
    info!(connection_id = %connection_id, user_id = %user_id, "WebSocket connection established");

    let message_handler = Arc::new(ClientMessageHandler::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.membership_store),
        Arc::clone(&state.typing),
    ));

    let connection = Connection::new(
        connection_id,
        user_id.clone(),
        Box::new(socket),
        outbound_receiver,
        message_handler,
    );

    match connection.run().await {
        Ok(()) => {
            info!(connection_id = %connection_id, user_id = %user_id, "WebSocket connection closed")
        }
        Err(e) => {
            warn!(
                connection_id = %connection_id,
                user_id = %user_id,
                error = ?e,
                "WebSocket connection error"
            )
        }
    }

    // the registry must not keep handing out a closed connection
    state.registry.unregister(connection_id).await;
    debug!(connection_id = %connection_id, "Connection removed from registry");
}

/// HTTP handler for a user's live status
///
/// GET /users/:user_id/status
pub async fn user_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<PresenceResponse> {
    let presence = state.registry.user_presence(&user_id).await;
    Json(PresenceResponse {
        user_id,
        online: presence.online,
        last_seen: presence.last_seen,
    })
}
