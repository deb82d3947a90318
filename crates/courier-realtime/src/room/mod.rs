//! Room membership system.
//!
//! A room is a broadcast address: every user has a personal room for
//! multi-device delivery, and every open chat has a chat room. Room
//! names are process-independent strings so the pub/sub bridge can
//! carry them across instances.

pub mod registry;
pub mod room;
pub mod subscription;

pub use registry::RoomRegistry;

use courier_core::types::{ChatId, UserId};

/// The personal room for a user, joined on every authenticated connection.
pub fn personal(user_id: UserId) -> String {
    format!("user:{user_id}")
}

/// The room for a chat, joined only while a client has the chat open.
pub fn chat(chat_id: ChatId) -> String {
    format!("chat:{chat_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_room_names() {
        let nil = Uuid::nil();
        assert_eq!(
            personal(UserId::from_uuid(nil)),
            "user:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            chat(ChatId::from_uuid(nil)),
            "chat:00000000-0000-0000-0000-000000000000"
        );
    }
}
