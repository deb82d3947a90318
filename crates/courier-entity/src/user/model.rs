//! User entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use courier_core::types::UserId;

/// A registered user in the Courier system.
///
/// Profile management happens in the account service; this core reads
/// users for participant checks and keeps `online`/`last_seen` as the
/// durable fallback behind the presence cache.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Unique user identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Human-readable display name.
    pub display_name: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// Durable online flag, mirrored best-effort from the presence cache.
    pub online: bool,
    /// Last time the user was seen online.
    pub last_seen: DateTime<Utc>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
