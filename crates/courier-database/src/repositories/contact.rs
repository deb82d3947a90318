//! Contact repository implementation.

use std::collections::HashSet;

use sqlx::PgPool;

use courier_core::error::{AppError, ErrorKind};
use courier_core::result::AppResult;
use courier_core::types::UserId;

/// Repository for resolving the contact graph.
///
/// Contact CRUD happens in the account service; this core only needs
/// the visibility question: who may see this user's presence.
#[derive(Debug, Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    /// Create a new contact repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the set of users allowed to see `user_id`'s presence.
    ///
    /// An accepted edge in either direction makes a peer visible; a
    /// blocked edge in either direction removes the pair entirely.
    pub async fn peers_of(&self, user_id: UserId) -> AppResult<HashSet<UserId>> {
        let peers = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT DISTINCT
                CASE WHEN c.owner_id = $1 THEN c.peer_id ELSE c.owner_id END
            FROM contacts c
            WHERE (c.owner_id = $1 OR c.peer_id = $1)
              AND c.status = 'accepted'
              AND NOT EXISTS (
                  SELECT 1 FROM contacts b
                  WHERE b.status = 'blocked'
                    AND ((b.owner_id = c.owner_id AND b.peer_id = c.peer_id)
                      OR (b.owner_id = c.peer_id AND b.peer_id = c.owner_id))
              )
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to resolve contact peers", e)
        })?;

        Ok(peers.into_iter().collect())
    }

    /// Check whether either user has blocked the other.
    pub async fn is_blocked(&self, a: UserId, b: UserId) -> AppResult<bool> {
        let blocked = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM contacts
                WHERE status = 'blocked'
                  AND ((owner_id = $1 AND peer_id = $2)
                    OR (owner_id = $2 AND peer_id = $1))
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to check block status", e)
        })?;

        Ok(blocked)
    }
}
