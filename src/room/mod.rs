// Public API
pub use handlers::{create_room, join_room, list_rooms, room_members, room_typing};
pub use service::{JoinOutcome, RoomService};
pub use types::{
    CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, JoinRoomResponse, MemberInfo,
    RoomInfo, TypingResponse,
};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
mod service;
mod types;
