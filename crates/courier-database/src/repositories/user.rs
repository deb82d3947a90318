//! User repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use courier_core::error::{AppError, ErrorKind};
use courier_core::result::AppResult;
use courier_core::types::UserId;
use courier_entity::user::User;

/// Repository for user lookups and durable presence mirroring.
///
/// User creation and profile updates happen in the account service;
/// this core only reads users and writes the presence fallback columns.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by primary key.
    pub async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find user by id", e))
    }

    /// Read the durable presence fallback: `(online, last_seen)`.
    pub async fn last_known_presence(
        &self,
        id: UserId,
    ) -> AppResult<Option<(bool, DateTime<Utc>)>> {
        sqlx::query_as::<_, (bool, DateTime<Utc>)>(
            "SELECT online, last_seen FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to read durable presence", e)
        })
    }

    /// Mirror the cache-resident presence state into the users table.
    pub async fn record_presence(
        &self,
        id: UserId,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE users SET online = $2, last_seen = $3, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(online)
            .bind(last_seen)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to record durable presence", e)
            })?;
        Ok(())
    }
}
