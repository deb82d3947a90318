//! Presence record value object.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral, cache-resident presence state for one user.
///
/// Invariant: `online` is true iff `connection_ids` is non-empty.
/// Absence of the record means offline, with last-seen taken from the
/// durable user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Whether the user has at least one live connection.
    pub online: bool,
    /// Last time the user was seen (updated when the last connection closes).
    pub last_seen: DateTime<Utc>,
    /// Live connection IDs across all processes.
    pub connection_ids: HashSet<Uuid>,
}

impl PresenceRecord {
    /// A fresh online record holding a single connection.
    pub fn online_with(connection_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            online: true,
            last_seen: now,
            connection_ids: HashSet::from([connection_id]),
        }
    }

    /// An offline record with a known last-seen time.
    pub fn offline_at(last_seen: DateTime<Utc>) -> Self {
        Self {
            online: false,
            last_seen,
            connection_ids: HashSet::new(),
        }
    }

    /// Add a connection and restore the online invariant.
    pub fn add_connection(&mut self, connection_id: Uuid, now: DateTime<Utc>) {
        self.connection_ids.insert(connection_id);
        self.online = true;
        self.last_seen = now;
    }

    /// Remove a connection. Returns `true` when the record is now fully
    /// offline (the set emptied), after flipping the flag and stamping
    /// `last_seen`.
    pub fn remove_connection(&mut self, connection_id: Uuid, now: DateTime<Utc>) -> bool {
        self.connection_ids.remove(&connection_id);
        if self.connection_ids.is_empty() {
            self.online = false;
            self.last_seen = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_iff_connections_present() {
        let now = Utc::now();
        let conn = Uuid::new_v4();
        let mut record = PresenceRecord::online_with(conn, now);
        assert!(record.online);

        assert!(record.remove_connection(conn, now));
        assert!(!record.online);
        assert!(record.connection_ids.is_empty());
    }

    #[test]
    fn test_second_connection_keeps_online() {
        let now = Utc::now();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let mut record = PresenceRecord::online_with(first, now);
        record.add_connection(second, now);

        assert!(!record.remove_connection(first, now));
        assert!(record.online);
        assert!(record.remove_connection(second, now));
        assert!(!record.online);
    }

    #[test]
    fn test_remove_unknown_connection_on_last() {
        let now = Utc::now();
        let conn = Uuid::new_v4();
        let mut record = PresenceRecord::online_with(conn, now);

        // Removing an id that was never added does not empty the set.
        assert!(!record.remove_connection(Uuid::new_v4(), now));
        assert!(record.online);
    }
}
