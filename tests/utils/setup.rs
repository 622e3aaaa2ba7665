use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use parlor::{
    event::BroadcastDispatcher,
    room::{models::RoomModel, repository::InMemoryMembershipStore, RoomService},
    websockets::{
        ClientMessageHandler, ConnectionId, ConnectionRegistry, InMemoryConnectionRegistry,
        TypingTracker,
    },
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// A client connection attached straight to the registry, bypassing the
/// actual WebSocket transport
pub struct TestConnection {
    pub connection_id: ConnectionId,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl TestConnection {
    /// Next frame already delivered to this connection, if any
    pub fn try_next_json(&mut self) -> Option<serde_json::Value> {
        self.receiver
            .try_recv()
            .ok()
            .map(|frame| serde_json::from_str(&frame).unwrap())
    }

    /// Wait briefly for the next frame; None when nothing arrives
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        tokio::time::timeout(Duration::from_millis(100), self.receiver.recv())
            .await
            .ok()
            .flatten()
            .map(|frame| serde_json::from_str(&frame).unwrap())
    }

    /// Number of frames waiting in the channel
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

pub struct TestSetup {
    pub store: Arc<InMemoryMembershipStore>,
    pub registry: Arc<dyn ConnectionRegistry>,
    pub typing: Arc<TypingTracker>,
    pub room_service: Arc<RoomService>,
    /// Rooms created by the builder, in declaration order
    pub rooms: Vec<RoomModel>,
}

impl TestSetup {
    /// Registers a connection with no room subscription
    pub async fn connect(&self, user_id: &str) -> TestConnection {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection_id = self.registry.register(user_id.to_string(), sender).await;
        TestConnection {
            connection_id,
            receiver,
        }
    }

    /// Registers a connection and subscribes it to a room
    pub async fn connect_to_room(&self, user_id: &str, room_id: &str) -> TestConnection {
        let connection = self.connect(user_id).await;
        self.registry.subscribe(connection.connection_id, room_id).await;
        connection
    }

    /// Handler that processes raw client intent frames, as the socket loop
    /// would
    pub fn intent_handler(&self) -> ClientMessageHandler {
        ClientMessageHandler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store) as _,
            Arc::clone(&self.typing),
        )
    }
}

pub struct TestSetupBuilder {
    rooms: Vec<(String, String)>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self { rooms: Vec::new() }
    }

    /// Pre-creates a room owned by `creator_id`
    pub fn with_room(mut self, name: &str, creator_id: &str) -> Self {
        self.rooms.push((name.to_string(), creator_id.to_string()));
        self
    }

    pub async fn build(self) -> TestSetup {
        let store = Arc::new(InMemoryMembershipStore::new());
        let registry: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryConnectionRegistry::new());
        let typing = Arc::new(TypingTracker::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&registry)));
        let room_service = Arc::new(RoomService::new(Arc::clone(&store) as _, dispatcher));

        let mut rooms = Vec::new();
        for (name, creator_id) in self.rooms {
            let room = room_service
                .create_room(name, creator_id)
                .await
                .expect("builder room should be creatable");
            rooms.push(room);
        }

        TestSetup {
            store,
            registry,
            typing,
            room_service,
            rooms,
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
