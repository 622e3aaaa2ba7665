// Public API
pub use dispatcher::BroadcastDispatcher;
pub use events::MembershipEvent;

// Internal modules
mod dispatcher;
mod events;
