use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use atelier_api::middleware::{decode_token, require_auth};
use atelier_api::state::{AppState, AppStateInner};
use atelier_api::{chat, notifications, reviews, transactions, users};
use atelier_gateway::connection;
use atelier_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("ATELIER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("ATELIER_DB_PATH").unwrap_or_else(|_| "atelier.db".into());
    let host = std::env::var("ATELIER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ATELIER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(atelier_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state: one dispatcher (registry + event bus) per process
    let dispatcher = Dispatcher::new();
    let state = AppStateInner::new(db, dispatcher, jwt_secret);

    // Routes
    let protected_routes = Router::new()
        .route("/users/me", get(users::get_me))
        .route("/users/me/role", patch(users::set_role))
        .route("/chat/rooms", get(chat::get_rooms).post(chat::create_room))
        .route("/chat/rooms/{room_id}/messages", get(chat::get_messages))
        .route(
            "/transactions",
            post(transactions::create_transaction).get(transactions::get_my_transactions),
        )
        .route("/transactions/{id}", get(transactions::get_transaction))
        .route(
            "/transactions/{id}/status",
            patch(transactions::update_transaction_status),
        )
        .route(
            "/transactions/{id}/reviews",
            get(transactions::get_transaction_reviews),
        )
        .route("/reviews", post(reviews::create_review))
        .route("/notifications", get(notifications::get_notifications))
        .route(
            "/notifications/unread-count",
            get(notifications::get_unread_count),
        )
        .route("/notifications/read-all", patch(notifications::mark_all_read))
        .route("/notifications/{id}/read", patch(notifications::mark_read))
        .route(
            "/notifications/settings",
            get(notifications::get_settings).patch(notifications::update_settings),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/gateway/chat", get(chat_ws))
        .route("/gateway/notifications", get(notifications_ws))
        .with_state(state);

    let app = Router::new()
        .merge(protected_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Atelier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct WsAuthQuery {
    token: String,
}

/// Chat namespace upgrade. The bearer credential rides the query string and
/// is validated before the upgrade completes; a bad token gets a plain 401
/// and no socket.
async fn chat_ws(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let claims = match decode_token(&state.jwt_secret, &query.token) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| {
        connection::handle_chat_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            claims.sub,
            claims.nickname,
        )
    })
    .into_response()
}

/// Notifications namespace upgrade: outbound-only stream for one user.
async fn notifications_ws(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let claims = match decode_token(&state.jwt_secret, &query.token) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| {
        connection::handle_notifications_connection(socket, state.dispatcher.clone(), claims.sub)
    })
    .into_response()
}
