pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod serde_i64_string;
pub mod store;
pub mod subscriptions;
pub mod utils;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dispatch::DispatchEngine;
use crate::identity::{IdentityStore, PresenceStore};
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::store::{MessageStore, PgMessageStore};
use crate::subscriptions::SubscriptionTable;
use crate::utils::auth::TokenService;
use crate::utils::ids;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Hard cap on any history `limit` query parameter.
pub const MAX_MESSAGES_LIMIT: i64 = 200;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub subscriptions: Arc<SubscriptionTable>,
    pub store: Arc<dyn MessageStore>,
    pub identity: Arc<dyn PresenceStore>,
    pub dispatcher: Arc<DispatchEngine>,
    pub tokens: Arc<TokenService>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, pool: DbPool) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.send_buffer));
        let subscriptions = Arc::new(SubscriptionTable::new());
        let id_gen = Arc::new(ids::generator(config.machine_id));
        let store: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(
            pool.clone(),
            id_gen,
            config.store_timeout,
        ));
        let identity: Arc<dyn PresenceStore> =
            Arc::new(IdentityStore::new(pool, config.store_timeout));
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Arc::new(DispatchEngine::new(
            subscriptions.clone(),
            store.clone(),
            metrics.clone(),
            config.max_message_len,
        ));
        let tokens = Arc::new(TokenService::new(&config.jwt_secret, config.jwt_expiry_secs));
        Self {
            config: Arc::new(config),
            registry,
            subscriptions,
            store,
            identity,
            dispatcher,
            tokens,
            metrics,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/api/auth/token", post(handlers::auth::post_token))
        .route(
            "/api/messages/room/{room}",
            get(handlers::history::get_room_messages),
        )
        .route(
            "/api/messages/private",
            get(handlers::history::get_private_messages),
        )
        .route(
            "/api/messages/recent",
            get(handlers::history::get_recent_messages),
        )
        .route(
            "/api/messages/{message_id}",
            put(handlers::messages::put_message).delete(handlers::messages::delete_message),
        )
        .route("/api/users/online", get(handlers::users::get_online_users))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> String {
    state.metrics.render()
}
