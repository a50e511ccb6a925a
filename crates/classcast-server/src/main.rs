use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use classcast_api::dashboard;
use classcast_api::directory::Directory;
use classcast_api::messages;
use classcast_api::middleware::require_auth;
use classcast_api::receipts;
use classcast_api::state::{AppState, AppStateInner};
use classcast_gateway::connection;
use classcast_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classcast=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CLASSCAST_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("CLASSCAST_DB_PATH").unwrap_or_else(|_| "classcast.db".into());
    let host = std::env::var("CLASSCAST_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CLASSCAST_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let directory_url = std::env::var("CLASSCAST_DIRECTORY_URL")
        .map_err(|_| anyhow::anyhow!("CLASSCAST_DIRECTORY_URL must be set"))?;
    let directory_token = std::env::var("CLASSCAST_DIRECTORY_TOKEN").ok();

    // Init database
    let db = classcast_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        directory: Directory::http(directory_url, directory_token),
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    // Routes
    let api_routes = Router::new()
        .route("/messages", get(messages::list_messages))
        .route("/messages", post(messages::create_message))
        .route("/messages/preview", post(messages::preview_audience))
        .route("/messages/delete", post(messages::delete_messages))
        .route("/messages/{message_id}", patch(messages::edit_message))
        .route("/messages/{message_id}/recipients", get(receipts::list_recipients))
        .route("/messages/{message_id}/stats", get(receipts::message_stats))
        .route("/dashboard/stats", get(dashboard::get_stats))
        .route("/inbox", get(receipts::get_inbox))
        .route("/inbox/{message_id}/read", post(receipts::mark_read))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(ServerState {
        dispatcher,
        jwt_secret,
    });

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Classcast server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
