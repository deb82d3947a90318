//! Application state shared across all handlers.

use std::sync::Arc;

use sqlx::PgPool;

use courier_auth::jwt::JwtDecoder;
use courier_cache::CacheManager;
use courier_core::config::AppConfig;
use courier_database::repositories::{
    ChatRepository, ContactRepository, MessageRepository, UserRepository,
};
use courier_realtime::server::RealtimeEngine;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are `Arc`-wrapped (or internally pooled) for cheap
/// cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// PostgreSQL connection pool.
    pub db_pool: PgPool,
    /// Cache manager (Redis or in-memory).
    pub cache: Arc<CacheManager>,
    /// JWT decoder for handshake authentication.
    pub jwt_decoder: Arc<JwtDecoder>,
    /// Realtime delivery engine.
    pub realtime: RealtimeEngine,
    /// User repository.
    pub users: Arc<UserRepository>,
    /// Chat repository.
    pub chats: Arc<ChatRepository>,
    /// Message repository.
    pub messages: Arc<MessageRepository>,
    /// Contact repository.
    pub contacts: Arc<ContactRepository>,
}
