//! Courier server — realtime delivery core for direct messaging.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use courier_core::config::AppConfig;
use courier_core::error::AppError;

#[tokio::main]
async fn main() {
    let env = std::env::var("COURIER_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt().json().with_env_filter(filter).with_target(true).init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main server run function.
///
/// Any infrastructure failure here is fatal: the process refuses to
/// accept connections it cannot serve correctly.
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Courier v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────
    let db = courier_database::DatabasePool::connect(&config.database).await?;
    courier_database::migration::run_migrations(db.pool()).await?;
    let pool = db.pool().clone();

    // ── Cache ────────────────────────────────────────────────
    let cache = Arc::new(courier_cache::CacheManager::new(&config.cache).await?);

    // ── Repositories ─────────────────────────────────────────
    let users = Arc::new(courier_database::repositories::UserRepository::new(
        pool.clone(),
    ));
    let chats = Arc::new(courier_database::repositories::ChatRepository::new(
        pool.clone(),
    ));
    let messages = Arc::new(courier_database::repositories::MessageRepository::new(
        pool.clone(),
    ));
    let contacts = Arc::new(courier_database::repositories::ContactRepository::new(
        pool.clone(),
    ));

    // ── Realtime engine ──────────────────────────────────────
    let bridge = courier_realtime::RealtimeEngine::build_bridge(&config.realtime).await?;
    let realtime = courier_realtime::RealtimeEngine::new(
        config.realtime.clone(),
        bridge,
        cache.clone(),
        users.clone(),
        contacts.clone(),
        chats.clone(),
        messages.clone(),
    );

    // ── HTTP surface ─────────────────────────────────────────
    let jwt_decoder = Arc::new(courier_auth::jwt::JwtDecoder::new(&config.auth));
    let state = courier_api::AppState {
        config: Arc::new(config.clone()),
        db_pool: pool,
        cache,
        jwt_decoder,
        realtime: realtime.clone(),
        users,
        chats,
        messages,
        contacts,
    };
    let router = courier_api::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(addr = %addr, "Courier listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(realtime.clone()))
        .await
        .map_err(|e| AppError::internal(format!("Server failed: {e}")))?;

    db.close().await;
    tracing::info!("Courier stopped");
    Ok(())
}

/// Wait for Ctrl-C, then shut the realtime engine down.
async fn shutdown_signal(realtime: courier_realtime::RealtimeEngine) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
    realtime.shutdown().await;
}
