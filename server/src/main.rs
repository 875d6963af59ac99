//! foodswiftd — Food Swift server.

use std::sync::Arc;

use foodswift::config::Config;
use foodswift::db::PgStore;
use foodswift::routes::build_router;
use foodswift::state::AppState;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // Load .env if present (local dev).
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Tracing.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(true);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("foodswiftd starting");
    info!(listen = %config.listen_addr, mode = ?config.mode);
    if config.uses_dev_secret() {
        warn!("ACCESS_TOKEN_SECRET not set, using the development secret");
    }

    // ── Document store ──────────────────────────────────────
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to Postgres");

    let store = PgStore::new(pool);
    store.migrate().await.expect("failed to apply schema");
    info!("database ready");

    // ── Shared state + routes ───────────────────────────────
    let state = AppState::new(Arc::new(store), config.clone());
    let app = build_router(state);

    // ── Bind & serve ────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind");

    info!(addr = %config.listen_addr, "foodswiftd listening");

    axum::serve(listener, app).await.expect("server error");
}
