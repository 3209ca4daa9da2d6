mod auth;
mod config;
mod db;
mod error;
mod extractors;
mod gallery;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config};
use crate::state::AppState;
use crate::storage::discord::DiscordStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    // Chat-platform storage is optional; uploads stay local without it
    let discord = DiscordStorage::from_config(&config.discord).map(Arc::new);
    if discord.is_some() {
        tracing::info!("Chat-platform storage backend enabled");
    } else {
        tracing::info!("No chat-platform storage configured, uploads are local only");
    }

    // Build app state
    let state = AppState {
        db: pool,
        config: config.clone(),
        discord,
    };

    // Build router
    let mut app = Router::new()
        .route("/", get(routes::home::index))
        .route("/assets/{*path}", get(routes::assets::serve))
        .merge(routes::auth::router())
        .merge(routes::images::router())
        .merge(routes::collections::router());

    // Test-only seed endpoint: creates a user + session, returns session cookie
    if std::env::var("ATELIER_TEST_SEED").is_ok() {
        app = app.route("/test/seed", get(test_seed));
    }

    let app = app.layer(TraceLayer::new_for_http()).with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Test-only: seed a user + session and return the session cookie.
/// Only mounted when ATELIER_TEST_SEED env var is set.
async fn test_seed(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.get().unwrap();
    conn.execute(
        "INSERT OR IGNORE INTO users (email, password_hash) VALUES ('test@atelier.local', 'x')",
        [],
    )
    .unwrap();

    // Get the actual user id (may already exist from previous seed call)
    let uid: i64 = conn
        .query_row(
            "SELECT id FROM users WHERE email = 'test@atelier.local'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    drop(conn);

    let token =
        auth::session::create_session(&state.db, uid, state.config.auth.session_hours).unwrap();

    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age=3600",
        state.config.auth.cookie_name, token
    );

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        format!("{{\"user_id\":{},\"email\":\"test@atelier.local\"}}", uid),
    )
}

