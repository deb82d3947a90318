//! Cache key builders for all Courier cache entries.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses.

use courier_core::types::UserId;

/// Prefix applied to all Courier cache keys.
const PREFIX: &str = "courier";

// ── Presence keys ──────────────────────────────────────────

/// Cache key for a user's presence record.
pub fn presence(user_id: UserId) -> String {
    format!("{PREFIX}:presence:{user_id}")
}
