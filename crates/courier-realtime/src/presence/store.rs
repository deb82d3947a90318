//! Presence store — TTL-bound records in the cache, durable fallback.
//!
//! Presence is advisory and lossy: the TTL bounds the staleness left by
//! a crashed process that never announced its users offline. True
//! liveness is reconstructed from client reconnect plus the bounded
//! staleness window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use courier_cache::{keys, CacheManager};
use courier_core::result::AppResult;
use courier_core::traits::cache::CacheProvider;
use courier_core::types::UserId;
use courier_entity::presence::PresenceRecord;

use crate::connection::handle::ConnectionId;
use crate::store::UserDirectory;

/// Outcome of removing one connection from a user's presence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnection {
    /// The connection set emptied; the user is now fully offline.
    FullyOffline {
        /// The last-seen time stamped on the record, carried to the
        /// offline broadcast.
        last_seen: chrono::DateTime<Utc>,
    },
    /// Other connections remain; no broadcast.
    StillConnected,
}

/// Tracks which users are reachable, shared by all process instances.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    /// Shared cache holding the TTL-bound records.
    cache: Arc<CacheManager>,
    /// Durable store consulted on cache miss and mirrored best-effort.
    directory: Arc<dyn UserDirectory>,
    /// Record TTL; heartbeats extend it.
    ttl: Duration,
}

impl PresenceStore {
    /// Create a new presence store.
    pub fn new(cache: Arc<CacheManager>, directory: Arc<dyn UserDirectory>, ttl: Duration) -> Self {
        Self {
            cache,
            directory,
            ttl,
        }
    }

    /// Record a new live connection for a user.
    ///
    /// Returns `true` when this flipped the user from offline to online
    /// (the caller broadcasts only on that full transition). The durable
    /// mirror is updated out-of-band so a process crash still leaves the
    /// store eventually consistent.
    pub async fn set_online(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> AppResult<bool> {
        let key = keys::presence(user_id);
        let now = Utc::now();

        let existing: Option<PresenceRecord> = self.cache.get_json(&key).await?;
        let was_online = existing.as_ref().map(|r| r.online).unwrap_or(false);

        let record = match existing {
            Some(mut record) => {
                record.add_connection(connection_id, now);
                record
            }
            None => PresenceRecord::online_with(connection_id, now),
        };

        self.cache.set_json(&key, &record, self.ttl).await?;

        // Durable mirror is fire-and-forget; losing it costs one TTL
        // window of staleness at most.
        let directory = self.directory.clone();
        tokio::spawn(async move {
            if let Err(e) = directory.record_presence(user_id, true, now).await {
                warn!(user_id = %user_id, error = %e, "Durable online mirror failed");
            }
        });

        Ok(!was_online)
    }

    /// Remove a connection from a user's presence record.
    ///
    /// When the set empties the record flips offline, `last_seen` is
    /// stamped, the TTL is refreshed (so peers can read last-seen
    /// cheaply for one more window), and the durable store is updated.
    pub async fn remove_connection(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> AppResult<Disconnection> {
        let key = keys::presence(user_id);
        let now = Utc::now();

        let Some(mut record) = self.cache.get_json::<PresenceRecord>(&key).await? else {
            // Record already expired; the user is offline as far as any
            // instance can tell.
            return Ok(Disconnection::FullyOffline { last_seen: now });
        };

        if record.remove_connection(connection_id, now) {
            self.cache.set_json(&key, &record, self.ttl).await?;

            if let Err(e) = self.directory.record_presence(user_id, false, now).await {
                warn!(user_id = %user_id, error = %e, "Durable offline mirror failed");
            }

            Ok(Disconnection::FullyOffline { last_seen: now })
        } else {
            self.cache.set_json(&key, &record, self.ttl).await?;
            Ok(Disconnection::StillConnected)
        }
    }

    /// Get a user's presence.
    ///
    /// Falls back to the durable record (with an empty connection set,
    /// since connection membership is inherently cache-only) when the
    /// cached record has expired. `None` means the user is unknown.
    pub async fn get_presence(&self, user_id: UserId) -> AppResult<Option<PresenceRecord>> {
        let key = keys::presence(user_id);

        if let Some(record) = self.cache.get_json::<PresenceRecord>(&key).await? {
            return Ok(Some(record));
        }

        Ok(self
            .directory
            .last_known_presence(user_id)
            .await?
            .map(|(online, last_seen)| PresenceRecord {
                online,
                last_seen,
                connection_ids: Default::default(),
            }))
    }

    /// Extend the TTL of a user's presence record.
    ///
    /// A heartbeat after the record expired is silently dropped: the
    /// client must re-announce online status, not merely heartbeat,
    /// after a gap longer than the TTL.
    pub async fn heartbeat(&self, user_id: UserId) -> AppResult<()> {
        let key = keys::presence(user_id);
        self.cache.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Batched presence lookup, cache-only.
    ///
    /// Users with no cache entry are omitted from the result; callers
    /// must treat absence as unknown/offline, not as an error.
    pub async fn bulk_get_presence(
        &self,
        user_ids: &[UserId],
    ) -> AppResult<HashMap<UserId, PresenceRecord>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let cache_keys: Vec<String> = user_ids.iter().map(|id| keys::presence(*id)).collect();
        let values = self.cache.get_many(&cache_keys).await?;

        let mut result = HashMap::new();
        for (user_id, value) in user_ids.iter().zip(values) {
            let Some(raw) = value else { continue };
            match serde_json::from_str::<PresenceRecord>(&raw) {
                Ok(record) => {
                    result.insert(*user_id, record);
                }
                Err(e) => warn!(user_id = %user_id, error = %e, "Malformed presence record"),
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_cache, FakeDirectory};
    use uuid::Uuid;

    fn store_with(directory: Arc<FakeDirectory>) -> PresenceStore {
        PresenceStore::new(memory_cache(), directory, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_first_connection_flips_online() {
        let store = store_with(Arc::new(FakeDirectory::default()));
        let user = UserId::new();

        let newly_online = store.set_online(user, Uuid::new_v4()).await.unwrap();
        assert!(newly_online);

        let record = store.get_presence(user).await.unwrap().unwrap();
        assert!(record.online);
        assert_eq!(record.connection_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_second_connection_is_not_a_transition() {
        let store = store_with(Arc::new(FakeDirectory::default()));
        let user = UserId::new();

        assert!(store.set_online(user, Uuid::new_v4()).await.unwrap());
        assert!(!store.set_online(user, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_only_when_last_connection_closes() {
        let store = store_with(Arc::new(FakeDirectory::default()));
        let user = UserId::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.set_online(user, first).await.unwrap();
        store.set_online(user, second).await.unwrap();

        assert_eq!(
            store.remove_connection(user, first).await.unwrap(),
            Disconnection::StillConnected
        );
        let record = store.get_presence(user).await.unwrap().unwrap();
        assert!(record.online);

        assert!(matches!(
            store.remove_connection(user, second).await.unwrap(),
            Disconnection::FullyOffline { .. }
        ));
        let record = store.get_presence(user).await.unwrap().unwrap();
        assert!(!record.online);
        assert!(record.connection_ids.is_empty());
    }

    #[tokio::test]
    async fn test_remove_with_expired_record_reports_offline() {
        let store = store_with(Arc::new(FakeDirectory::default()));
        let user = UserId::new();

        assert!(matches!(
            store.remove_connection(user, Uuid::new_v4()).await.unwrap(),
            Disconnection::FullyOffline { .. }
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_on_absent_record_is_noop() {
        let store = store_with(Arc::new(FakeDirectory::default()));
        let user = UserId::new();

        store.heartbeat(user).await.unwrap();
        assert!(store.get_presence(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_miss_falls_back_to_durable_record() {
        let directory = Arc::new(FakeDirectory::default());
        let last_seen = Utc::now() - chrono::Duration::minutes(10);
        let user = UserId::new();
        directory.seed(user, false, last_seen);

        let store = store_with(directory);
        let record = store.get_presence(user).await.unwrap().unwrap();

        assert!(!record.online);
        assert_eq!(record.last_seen, last_seen);
        assert!(record.connection_ids.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_omits_unknown_users() {
        let store = store_with(Arc::new(FakeDirectory::default()));
        let known = UserId::new();
        let unknown = UserId::new();

        store.set_online(known, Uuid::new_v4()).await.unwrap();

        let result = store.bulk_get_presence(&[known, unknown]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key(&known));
        assert!(!result.contains_key(&unknown));
    }

    #[tokio::test]
    async fn test_offline_mirror_written_durably() {
        let directory = Arc::new(FakeDirectory::default());
        let store = store_with(directory.clone());
        let user = UserId::new();
        let conn = Uuid::new_v4();

        store.set_online(user, conn).await.unwrap();
        // Let the spawned online mirror land before going offline.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store.remove_connection(user, conn).await.unwrap();

        // The offline path writes the mirror synchronously.
        let (online, _) = directory.get(user).expect("mirrored");
        assert!(!online);
    }
}
