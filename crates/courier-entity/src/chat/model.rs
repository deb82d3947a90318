//! Chat entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use courier_core::types::{ChatId, MessageId, UserId};

/// A 1:1 conversation between exactly two users.
///
/// The participant pair is stored normalized (sorted by UUID) under a
/// unique index, so at most one chat exists per unordered pair and the
/// "other participant" is always derivable from the row itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    /// Unique chat identifier.
    pub id: ChatId,
    /// The participant with the lower UUID.
    pub participant_low: UserId,
    /// The participant with the higher UUID.
    pub participant_high: UserId,
    /// The most recent message in the chat, if any.
    pub last_message_id: Option<MessageId>,
    /// Last activity timestamp, used for inbox ordering.
    pub last_activity: DateTime<Utc>,
    /// When the chat was created.
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Normalize an unordered participant pair into (low, high) order.
    pub fn normalized_pair(a: UserId, b: UserId) -> (UserId, UserId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Check whether the given user is one of the two participants.
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participant_low == user_id || self.participant_high == user_id
    }

    /// Return the participant that is not `user_id`.
    ///
    /// Returns `None` when `user_id` is not a participant at all.
    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        if self.participant_low == user_id {
            Some(self.participant_high)
        } else if self.participant_high == user_id {
            Some(self.participant_low)
        } else {
            None
        }
    }

    /// Both participants of the chat.
    pub fn participants(&self) -> [UserId; 2] {
        [self.participant_low, self.participant_high]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_between(a: UserId, b: UserId) -> Chat {
        let (low, high) = Chat::normalized_pair(a, b);
        Chat {
            id: ChatId::new(),
            participant_low: low,
            participant_high: high,
            last_message_id: None,
            last_activity: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalized_pair_is_order_independent() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(Chat::normalized_pair(a, b), Chat::normalized_pair(b, a));
    }

    #[test]
    fn test_other_participant() {
        let a = UserId::new();
        let b = UserId::new();
        let chat = chat_between(a, b);

        assert_eq!(chat.other_participant(a), Some(b));
        assert_eq!(chat.other_participant(b), Some(a));
        assert_eq!(chat.other_participant(UserId::new()), None);
    }

    #[test]
    fn test_is_participant() {
        let a = UserId::new();
        let b = UserId::new();
        let chat = chat_between(a, b);

        assert!(chat.is_participant(a));
        assert!(chat.is_participant(b));
        assert!(!chat.is_participant(UserId::new()));
    }
}
