// Public API
pub use handler::{
    user_status, websocket_handler, ClientMessageHandler, ConnectQuery, PresenceResponse,
};
pub use messages::{ClientMessage, ServerMessage};
pub use registry::{
    ConnectionId, ConnectionRegistry, InMemoryConnectionRegistry, Presence, RoomConnection,
};
pub use socket::{Connection, MessageHandler, SocketError, SocketWrapper};
pub use typing::TypingTracker;

// Internal modules
mod handler;
pub mod messages;
pub mod registry;
mod socket;
pub mod typing;
