use std::sync::Arc;
use tracing::{debug, warn};

use super::events::MembershipEvent;
use crate::websockets::messages::ServerMessage;
use crate::websockets::registry::ConnectionRegistry;

/// Fans one membership event out to every live connection in its room
///
/// Delivery is best effort per connection: a connection whose channel has
/// closed is removed from the registry and the remaining sends continue
/// untouched. `dispatch` itself never fails.
pub struct BroadcastDispatcher {
    registry: Arc<dyn ConnectionRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn dispatch(&self, event: MembershipEvent) {
        let message = ServerMessage::from(&event);
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(room_id = %event.room_id(), error = %e, "Failed to serialize membership event");
                return;
            }
        };

        let targets = self.registry.connections_in(event.room_id()).await;
        let mut dead = Vec::new();
        for target in &targets {
            if target.sender.send(payload.clone()).is_err() {
                dead.push(target.connection_id);
            }
        }

        debug!(
            room_id = %event.room_id(),
            user_id = %event.user_id(),
            kind = event.kind(),
            delivered = targets.len() - dead.len(),
            "Membership event dispatched"
        );

        for connection_id in dead {
            warn!(connection_id = %connection_id, "Dropping connection with closed channel");
            self.registry.unregister(connection_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websockets::registry::{ConnectionId, InMemoryConnectionRegistry};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<InMemoryConnectionRegistry>,
        dispatcher: BroadcastDispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(InMemoryConnectionRegistry::new());
            let dispatcher =
                BroadcastDispatcher::new(Arc::clone(&registry) as Arc<dyn ConnectionRegistry>);
            Self {
                registry,
                dispatcher,
            }
        }

        async fn connect(
            &self,
            user_id: &str,
            room_id: Option<&str>,
        ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
            let (sender, receiver) = mpsc::unbounded_channel();
            let id = self.registry.register(user_id.to_string(), sender).await;
            if let Some(room_id) = room_id {
                self.registry.subscribe(id, room_id).await;
            }
            (id, receiver)
        }
    }

    fn joined(room_id: &str, user_id: &str) -> MembershipEvent {
        MembershipEvent::Joined {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_only_the_event_room() {
        let fixture = Fixture::new();
        let (_a, mut rx_a) = fixture.connect("u1", Some("sweet-lark")).await;
        let (_b, mut rx_b) = fixture.connect("u2", Some("sweet-lark")).await;
        let (_c, mut rx_c) = fixture.connect("u3", Some("quiet-lake")).await;
        let (_d, mut rx_d) = fixture.connect("u4", None).await;

        fixture.dispatcher.dispatch(joined("sweet-lark", "u9")).await;

        let expected = json!({
            "type": "user_joined",
            "room_id": "sweet-lark",
            "user_id": "u9",
        });
        for rx in [&mut rx_a, &mut rx_b] {
            let frame = rx.try_recv().unwrap();
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value, expected);
        }
        assert!(rx_c.try_recv().is_err());
        assert!(rx_d.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_to_empty_room_is_silent() {
        let fixture = Fixture::new();
        fixture.dispatcher.dispatch(joined("empty-attic", "u1")).await;
    }

    #[tokio::test]
    async fn test_dead_connections_are_unregistered() {
        let fixture = Fixture::new();
        let (dead_id, rx_dead) = fixture.connect("u1", Some("sweet-lark")).await;
        let (live_id, mut rx_live) = fixture.connect("u2", Some("sweet-lark")).await;
        drop(rx_dead);

        fixture.dispatcher.dispatch(joined("sweet-lark", "u9")).await;

        assert!(rx_live.try_recv().is_ok());
        let remaining: Vec<ConnectionId> = fixture
            .registry
            .connections_in("sweet-lark")
            .await
            .iter()
            .map(|c| c.connection_id)
            .collect();
        assert_eq!(remaining, vec![live_id]);
        assert!(!remaining.contains(&dead_id));
    }

    #[tokio::test]
    async fn test_dispatch_preserves_per_connection_order() {
        let fixture = Fixture::new();
        let (_id, mut rx) = fixture.connect("u1", Some("sweet-lark")).await;

        fixture.dispatcher.dispatch(joined("sweet-lark", "u2")).await;
        fixture.dispatcher.dispatch(joined("sweet-lark", "u3")).await;
        fixture
            .dispatcher
            .dispatch(MembershipEvent::Left {
                room_id: "sweet-lark".to_string(),
                user_id: "u2".to_string(),
            })
            .await;

        let kinds: Vec<serde_json::Value> = (0..3)
            .map(|_| serde_json::from_str(&rx.try_recv().unwrap()).unwrap())
            .collect();
        assert_eq!(kinds[0]["user_id"], "u2");
        assert_eq!(kinds[0]["type"], "user_joined");
        assert_eq!(kinds[1]["user_id"], "u3");
        assert_eq!(kinds[2]["type"], "user_left");
    }
}
