//! Room registry — manages all rooms and memberships.

use dashmap::DashMap;

use crate::connection::handle::ConnectionId;

use super::room::Room;
use super::subscription::MembershipTracker;

/// Registry of all active rooms on this process.
///
/// Rooms only track connections held by this process; cross-process
/// membership is invisible here and reached through the bridge.
#[derive(Debug)]
pub struct RoomRegistry {
    /// Room name → Room.
    rooms: DashMap<String, Room>,
    /// Membership tracker (reverse index).
    memberships: MembershipTracker,
}

impl RoomRegistry {
    /// Creates a new room registry.
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: MembershipTracker::new(),
        }
    }

    /// Joins a connection to a room.
    pub fn join(&self, room_name: String, conn_id: ConnectionId) {
        self.rooms
            .entry(room_name.clone())
            .or_insert_with(|| Room::new(room_name.clone()))
            .join(conn_id);

        self.memberships.add(conn_id, room_name);
    }

    /// Removes a connection from a room.
    pub fn leave(&self, room_name: &str, conn_id: ConnectionId) {
        if let Some(mut room) = self.rooms.get_mut(room_name) {
            room.leave(conn_id);
            if room.is_empty() {
                drop(room);
                self.rooms.remove(room_name);
            }
        }
        self.memberships.remove(conn_id, room_name);
    }

    /// Removes a connection from all rooms it is a member of.
    pub fn leave_all(&self, conn_id: ConnectionId) {
        let rooms = self.memberships.remove_all(conn_id);
        for room_name in &rooms {
            if let Some(mut room) = self.rooms.get_mut(room_name) {
                room.leave(conn_id);
                if room.is_empty() {
                    drop(room);
                    self.rooms.remove(room_name);
                }
            }
        }
    }

    /// Returns all member connection IDs for a room.
    pub fn members(&self, room_name: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_name)
            .map(|room| room.member_ids())
            .unwrap_or_default()
    }

    /// Returns whether a connection is a member of a room.
    pub fn is_member(&self, room_name: &str, conn_id: ConnectionId) -> bool {
        self.memberships.rooms_of(conn_id).contains(room_name)
    }

    /// Returns total number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_join_and_members() {
        let registry = RoomRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.join("chat:1".to_string(), a);
        registry.join("chat:1".to_string(), b);

        let mut members = registry.members("chat:1");
        members.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(members, expected);
    }

    #[test]
    fn test_empty_room_is_dropped() {
        let registry = RoomRegistry::new();
        let a = Uuid::new_v4();

        registry.join("chat:1".to_string(), a);
        assert_eq!(registry.room_count(), 1);

        registry.leave("chat:1", a);
        assert_eq!(registry.room_count(), 0);
        assert!(registry.members("chat:1").is_empty());
    }

    #[test]
    fn test_leave_all_clears_every_room() {
        let registry = RoomRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.join("user:1".to_string(), a);
        registry.join("chat:1".to_string(), a);
        registry.join("chat:1".to_string(), b);

        registry.leave_all(a);

        assert!(registry.members("user:1").is_empty());
        assert_eq!(registry.members("chat:1"), vec![b]);
        assert!(!registry.is_member("chat:1", a));
    }

    #[test]
    fn test_is_member() {
        let registry = RoomRegistry::new();
        let a = Uuid::new_v4();

        registry.join("chat:1".to_string(), a);
        assert!(registry.is_member("chat:1", a));
        assert!(!registry.is_member("chat:2", a));
    }
}
