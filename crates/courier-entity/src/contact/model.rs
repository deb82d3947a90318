//! Contact relation entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use courier_core::types::{ContactId, UserId};

use super::status::ContactStatus;

/// A directed contact edge `(owner → peer)`, unique per ordered pair.
///
/// Two users may each hold opposite-direction edges. A blocked edge in
/// either direction makes the pair mutually invisible for presence and
/// new-chat creation, but past messages stay readable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    /// Unique contact relation identifier.
    pub id: ContactId,
    /// The user who owns this edge.
    pub owner_id: UserId,
    /// The user this edge points at.
    pub peer_id: UserId,
    /// Relation status.
    pub status: ContactStatus,
    /// Which user initiated a block, when status is `Blocked`.
    pub blocked_by: Option<UserId>,
    /// When the relation was created.
    pub created_at: DateTime<Utc>,
    /// When the relation was last updated.
    pub updated_at: DateTime<Utc>,
}
