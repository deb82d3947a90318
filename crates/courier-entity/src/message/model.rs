//! Message entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use courier_core::types::{ChatId, MessageId, UserId};

use super::kind::MessageKind;
use super::status::MessageStatus;

/// Maximum message content length in characters.
pub const MAX_CONTENT_LENGTH: usize = 5000;

/// A single message inside a chat.
///
/// Created on send, mutated only by the delivered/read acknowledgment
/// transitions, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// The chat this message belongs to.
    pub chat_id: ChatId,
    /// The user who sent it.
    pub sender_id: UserId,
    /// Message body. Non-empty, at most [`MAX_CONTENT_LENGTH`] characters.
    pub content: String,
    /// Content kind.
    pub kind: MessageKind,
    /// Current delivery status.
    pub status: MessageStatus,
    /// When the message reached a recipient device. Never after `read_at`.
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the recipient opened the message.
    pub read_at: Option<DateTime<Utc>>,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether `actor` may mark this message delivered right now.
    ///
    /// Only a recipient may acknowledge, and only a message still in
    /// `Sent` may move to `Delivered` (repeat attempts are no-ops).
    pub fn can_be_delivered_by(&self, actor: UserId) -> bool {
        actor != self.sender_id && self.status == MessageStatus::Sent
    }

    /// Whether `actor` may mark this message read right now.
    pub fn can_be_read_by(&self, actor: UserId) -> bool {
        actor != self.sender_id && self.status != MessageStatus::Read
    }
}

/// Validate send-message content: trims whitespace and enforces bounds.
///
/// Returns the trimmed content on success.
pub fn validate_content(content: &str) -> Result<String, courier_core::AppError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(courier_core::AppError::validation(
            "Message content is required",
        ));
    }
    if trimmed.chars().count() > MAX_CONTENT_LENGTH {
        return Err(courier_core::AppError::validation(format!(
            "Message too long (max {MAX_CONTENT_LENGTH} characters)"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: UserId, status: MessageStatus) -> Message {
        Message {
            id: MessageId::new(),
            chat_id: ChatId::new(),
            sender_id: sender,
            content: "hi".to_string(),
            kind: MessageKind::Text,
            status,
            delivered_at: None,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sender_cannot_acknowledge_own_message() {
        let sender = UserId::new();
        let msg = message(sender, MessageStatus::Sent);

        assert!(!msg.can_be_delivered_by(sender));
        assert!(!msg.can_be_read_by(sender));
    }

    #[test]
    fn test_deliver_only_from_sent() {
        let recipient = UserId::new();

        assert!(message(UserId::new(), MessageStatus::Sent).can_be_delivered_by(recipient));
        assert!(!message(UserId::new(), MessageStatus::Delivered).can_be_delivered_by(recipient));
        assert!(!message(UserId::new(), MessageStatus::Read).can_be_delivered_by(recipient));
    }

    #[test]
    fn test_read_from_any_state_but_read() {
        let recipient = UserId::new();

        assert!(message(UserId::new(), MessageStatus::Sent).can_be_read_by(recipient));
        assert!(message(UserId::new(), MessageStatus::Delivered).can_be_read_by(recipient));
        assert!(!message(UserId::new(), MessageStatus::Read).can_be_read_by(recipient));
    }

    #[test]
    fn test_validate_content_trims() {
        assert_eq!(validate_content("  hi  ").unwrap(), "hi");
    }

    #[test]
    fn test_validate_content_rejects_empty() {
        assert!(validate_content("").is_err());
        assert!(validate_content("   ").is_err());
    }

    #[test]
    fn test_validate_content_rejects_over_length() {
        let long = "x".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(validate_content(&long).is_err());
        let exact = "x".repeat(MAX_CONTENT_LENGTH);
        assert!(validate_content(&exact).is_ok());
    }
}
