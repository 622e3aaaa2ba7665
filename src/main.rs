use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parlor::event::BroadcastDispatcher;
use parlor::room::{self, repository::PostgresMembershipStore, RoomService};
use parlor::shared::AppState;
use parlor::websockets::{self, TypingTracker};
use parlor::{ConnectionRegistry, InMemoryConnectionRegistry, InMemoryMembershipStore, MembershipStore};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting parlor chat-room server");

    // PostgreSQL when DATABASE_URL is set, in-memory otherwise
    let membership_store: Arc<dyn MembershipStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::PgPool::connect(&database_url)
                .await
                .expect("Failed to connect to database");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run database migrations");
            info!("Using PostgreSQL membership store");
            Arc::new(PostgresMembershipStore::new(pool))
        }
        Err(_) => {
            info!("DATABASE_URL not set, using in-memory membership store");
            Arc::new(InMemoryMembershipStore::new())
        }
    };

    let registry: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryConnectionRegistry::new());
    let typing = Arc::new(TypingTracker::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&registry)));
    let room_service = Arc::new(RoomService::new(Arc::clone(&membership_store), dispatcher));

    let app_state = AppState::new(membership_store, room_service, registry, typing);

    // build our application
    let app = Router::new()
        .route("/", get(|| async { "parlor is running" }))
        .route("/rooms", post(room::create_room).get(room::list_rooms))
        .route("/rooms/:room_id/join", post(room::join_room))
        .route("/rooms/:room_id/members", get(room::room_members))
        .route("/rooms/:room_id/typing", get(room::room_typing))
        .route("/users/:user_id/status", get(websockets::user_status))
        .route("/ws", get(websockets::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .unwrap();
    info!("Server running on http://localhost:{}", port);
    axum::serve(listener, app).await.unwrap();
}
