// Library crate for the parlor chat-room server
// This file exposes the public API for integration tests

pub mod event;
pub mod room;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use event::{BroadcastDispatcher, MembershipEvent};
pub use room::{
    models::{MemberRole, MembershipModel, NewRoom, RoomModel},
    repository::{InMemoryMembershipStore, MembershipStore, PostgresMembershipStore},
    JoinOutcome, RoomService,
};
pub use shared::{AppError, AppState};
pub use websockets::{
    ClientMessage, ClientMessageHandler, ConnectionId, ConnectionRegistry,
    InMemoryConnectionRegistry, MessageHandler, Presence, ServerMessage, TypingTracker,
};
