//! Chat repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use courier_core::error::{AppError, ErrorKind};
use courier_core::result::AppResult;
use courier_core::types::{ChatId, MessageId, UserId};
use courier_entity::chat::Chat;

/// Repository for chat lookups and summary updates.
#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    /// Create a new chat repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a chat by primary key.
    pub async fn find_by_id(&self, id: ChatId) -> AppResult<Option<Chat>> {
        sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find chat by id", e))
    }

    /// Find the chat between two users, if one exists.
    ///
    /// The pair is normalized before lookup, so argument order is
    /// irrelevant.
    pub async fn find_by_participants(&self, a: UserId, b: UserId) -> AppResult<Option<Chat>> {
        let (low, high) = Chat::normalized_pair(a, b);
        sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE participant_low = $1 AND participant_high = $2",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find chat by participants", e)
        })
    }

    /// Create the chat for a participant pair, or return the existing one.
    ///
    /// The unique index on the normalized pair makes concurrent creates
    /// collapse into a single row.
    pub async fn create(&self, a: UserId, b: UserId) -> AppResult<Chat> {
        let (low, high) = Chat::normalized_pair(a, b);
        sqlx::query_as::<_, Chat>(
            r#"
            INSERT INTO chats (participant_low, participant_high)
            VALUES ($1, $2)
            ON CONFLICT (participant_low, participant_high)
                DO UPDATE SET participant_low = EXCLUDED.participant_low
            RETURNING *
            "#,
        )
        .bind(low)
        .bind(high)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create chat", e))
    }

    /// Update the chat summary after a new message.
    pub async fn touch_last_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE chats SET last_message_id = $2, last_activity = $3 WHERE id = $1")
            .bind(chat_id)
            .bind(message_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to update chat summary", e)
            })?;
        Ok(())
    }
}
