mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use eddy_api::auth::{self, AppState, AppStateInner};
use eddy_api::middleware::require_auth;
use eddy_api::{conversations, messages, reports};
use eddy_core::{
    AccessControl, Conversations, FsAccessControl, Messages, Moderation, NullAccessControl,
    Subscriptions,
};
use eddy_db::Database;
use eddy_gateway::Dispatcher;
use eddy_gateway::connection;

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    jwt_secret: String,
    poll_interval: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eddy=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Wire services; the abuse threshold and attachment root come from
    // config, never from ambient globals
    let dispatcher = Dispatcher::new();
    let access: Arc<dyn AccessControl> = match &config.attachment_root {
        Some(root) => Arc::new(FsAccessControl::new(root.clone())),
        None => Arc::new(NullAccessControl),
    };
    let subscriptions = Subscriptions::new(db.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        messages: Messages::new(db.clone(), subscriptions),
        moderation: Moderation::new(db.clone(), access, config.abuse_threshold),
        conversations: Conversations::new(db.clone()),
        dispatcher: dispatcher.clone(),
        jwt_secret: config.jwt_secret.clone(),
    });

    let gateway_state = GatewayState {
        db,
        dispatcher,
        jwt_secret: config.jwt_secret.clone(),
        poll_interval: config.poll_interval,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::post_message),
        )
        .route("/messages/{message_id}/report", post(reports::report_abuse))
        .route("/messages/{message_id}/spawn", post(conversations::spawn_conversation))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("eddy server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher,
            state.db,
            state.jwt_secret,
            state.poll_interval,
        )
    })
}
