//! Message repository implementation.
//!
//! Status transitions are single conditional `UPDATE` statements: the
//! precondition (current status, actor is not the sender) and the
//! mutation execute atomically at the storage layer, which is what makes
//! transitions monotonic under concurrent acknowledgments.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use courier_core::error::{AppError, ErrorKind};
use courier_core::result::AppResult;
use courier_core::types::{ChatId, MessageId, UserId};
use courier_entity::message::{Message, MessageKind};

/// Data required to persist a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Owning chat.
    pub chat_id: ChatId,
    /// Sending user.
    pub sender_id: UserId,
    /// Validated (trimmed, bounded) content.
    pub content: String,
    /// Content kind.
    pub kind: MessageKind,
}

/// Repository for message persistence and status transitions.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a new message with status `sent`.
    pub async fn create(&self, new: NewMessage) -> AppResult<Message> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (chat_id, sender_id, content, kind, status)
            VALUES ($1, $2, $3, $4, 'sent')
            RETURNING *
            "#,
        )
        .bind(new.chat_id)
        .bind(new.sender_id)
        .bind(&new.content)
        .bind(new.kind)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create message", e))
    }

    /// Find a message by primary key.
    pub async fn find_by_id(&self, id: MessageId) -> AppResult<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find message by id", e)
            })
    }

    /// Advance a message from `sent` to `delivered`.
    ///
    /// Returns the updated row, or `None` when the precondition failed:
    /// the actor is the sender, or the message already left `sent`.
    pub async fn mark_delivered(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET status = 'delivered', delivered_at = $3
            WHERE id = $1 AND sender_id <> $2 AND status = 'sent'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark message delivered", e)
        })
    }

    /// Advance a message to `read`, back-filling `delivered_at` when the
    /// message was never marked delivered.
    ///
    /// Returns the updated row, or `None` when the precondition failed:
    /// the actor is the sender, or the message is already `read`.
    pub async fn mark_read(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET status = 'read', read_at = $3, delivered_at = COALESCE(delivered_at, $3)
            WHERE id = $1 AND sender_id <> $2 AND status <> 'read'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark message read", e))
    }

    /// Batch-promote every `sent` message in a chat authored by someone
    /// other than `recipient` to `delivered`. Returns the promoted rows.
    ///
    /// Used for catch-up delivery when a client joins a chat room;
    /// already delivered/read messages are untouched by the filter.
    pub async fn mark_chat_delivered(
        &self,
        chat_id: ChatId,
        recipient: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET status = 'delivered', delivered_at = $3
            WHERE chat_id = $1 AND sender_id <> $2 AND status = 'sent'
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(recipient)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark chat delivered", e)
        })
    }
}
